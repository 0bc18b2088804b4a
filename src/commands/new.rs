//! Create a new article in the local store

use anyhow::Result;

use crate::content::slug;
use crate::store::{ContentStore, Draft};
use crate::Blog;

/// Placeholder body for a fresh article
const SCAFFOLD_BODY: &str = "Write your article here.";

/// Create a new article, unpublished unless `publish` is set
pub async fn run(blog: &Blog, title: &str, explicit_slug: Option<&str>, publish: bool) -> Result<()> {
    let store = blog.admin_store();
    let target = slug::resolve(explicit_slug, title);
    if !target.is_empty() && store.get(&target).await.is_ok() {
        anyhow::bail!("Article already exists: {}", target);
    }

    let draft = Draft {
        slug: explicit_slug.map(str::to_string),
        published: Some(publish),
        ..Draft::new(title, SCAFFOLD_BODY)
    };
    let record = store.put(draft).await?;

    println!("Created: {:?}", store.dir().join(&record.source));
    Ok(())
}
