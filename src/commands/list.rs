//! List site content

use anyhow::Result;

use crate::content::{tags, ArticleRecord};
use crate::Blog;

/// List site content by type
pub async fn run(blog: &Blog, content_type: &str) -> Result<()> {
    match content_type {
        "post" | "posts" => {
            let posts = blog.published_records().await;
            println!("Posts ({}) from the {} store:", posts.len(), blog.store().kind());
            print_records(&posts);
        }
        "draft" | "drafts" => {
            let drafts: Vec<ArticleRecord> = blog
                .admin_store()
                .list_all()
                .await
                .into_iter()
                .filter(|record| !record.published)
                .collect();
            println!("Drafts ({}):", drafts.len());
            print_records(&drafts);
        }
        "tag" | "tags" => {
            let posts = blog.published_records().await;
            let mut counts: Vec<_> = tags::tag_counts(&posts).into_iter().collect();
            counts.sort_by(|a, b| b.1.cmp(&a.1));
            println!("Tags ({}):", counts.len());
            for (tag, count) in counts {
                println!("  {} ({})", tag, count);
            }
        }
        _ => {
            anyhow::bail!("Unknown type: {}. Available: post, draft, tag", content_type);
        }
    }

    Ok(())
}

fn print_records(records: &[ArticleRecord]) {
    for record in records {
        println!(
            "  {} - {} [{}] {}",
            record.date.format("%Y-%m-%d"),
            record.title,
            record.slug,
            record.reading_time
        );
    }
}
