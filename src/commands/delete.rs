//! Delete an article from the local store

use anyhow::Result;

use crate::Blog;

pub async fn run(blog: &Blog, slug: &str) -> Result<()> {
    if !blog.admin_store().delete(slug).await {
        anyhow::bail!("Nothing to delete: {}", slug);
    }
    println!("Deleted: {}", slug);
    Ok(())
}
