//! Print one article

use anyhow::Result;

use crate::content::Rendered;
use crate::store::{ContentStore, StoreError};
use crate::Blog;

/// Print an article's metadata, and its rendered HTML when `html` is set
pub async fn run(blog: &Blog, slug: &str, html: bool) -> Result<()> {
    let record = match blog.get_by_slug(slug).await {
        Ok(record) => record,
        // Drafts are only in the local store
        Err(StoreError::NotFound(_)) => blog.admin_store().get(slug).await?,
        Err(e) => return Err(e.into()),
    };

    println!("{}", record.title);
    println!("  slug:      {}", record.slug);
    println!("  date:      {}", record.date.format("%Y-%m-%d %H:%M:%S"));
    println!("  published: {}", record.published);
    println!("  tags:      {}", record.tags.join(", "));
    println!("  reading:   {}", record.reading_time);
    println!("  source:    {}", record.source);
    println!();
    println!("{}", record.description);

    let rendered = blog.render(&record);
    if let Rendered::Fallback(_) = &rendered {
        println!("\n(body failed to render, see log)");
    }
    if html {
        println!("\n{}", rendered.html());
    }

    Ok(())
}
