//! Content stores
//!
//! Two stores share the article model: a read-only one backed by a remote
//! content repository and a read-write one backed by local files. They are
//! independent; writes to the local store never show up in the remote one.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::content::{ArticleRecord, FrontMatterError};

pub use local::LocalContentStore;
pub use remote::RemoteContentStore;

/// Errors from a single-article read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Article not found: {0}")]
    NotFound(String),

    #[error("Malformed front matter in {file}: {source}")]
    MalformedFrontMatter {
        file: String,
        #[source]
        source: FrontMatterError,
    },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Storage fault: {0}")]
    Storage(String),
}

/// Errors from an admin write
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("{0}")]
    Validation(String),

    #[error("Storage fault: {0}")]
    Storage(String),
}

/// Article fields supplied by an admin write; replaces the whole record
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Draft {
    pub slug: Option<String>,
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub cover_image: Option<String>,
    pub published: Option<bool>,
    pub tags: Vec<String>,
    /// Overrides the stored date; new records otherwise get the write time
    pub date: Option<DateTime<Utc>>,
}

impl Draft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }
}

/// Read capability shared by both stores
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Every readable article, newest first. Per-article faults drop that
    /// article; store-wide faults yield an empty list.
    async fn list(&self) -> Vec<ArticleRecord>;

    /// One article by slug
    async fn get(&self, slug: &str) -> Result<ArticleRecord, StoreError>;
}

/// The store behind the public blog
pub enum Store {
    Remote(RemoteContentStore),
    Local(LocalContentStore),
}

impl Store {
    pub fn kind(&self) -> &'static str {
        match self {
            Store::Remote(_) => "remote",
            Store::Local(_) => "local",
        }
    }

    /// The writable store, when this is one
    pub fn as_local(&self) -> Option<&LocalContentStore> {
        match self {
            Store::Local(store) => Some(store),
            Store::Remote(_) => None,
        }
    }
}

#[async_trait]
impl ContentStore for Store {
    async fn list(&self) -> Vec<ArticleRecord> {
        match self {
            Store::Remote(store) => store.list().await,
            Store::Local(store) => store.list().await,
        }
    }

    async fn get(&self, slug: &str) -> Result<ArticleRecord, StoreError> {
        match self {
            Store::Remote(store) => store.get(slug).await,
            Store::Local(store) => store.get(slug).await,
        }
    }
}

/// Keep the first record for each slug, dropping later duplicates
fn dedupe_slugs(records: Vec<ArticleRecord>) -> Vec<ArticleRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let fresh = seen.insert(record.slug.clone());
            if !fresh {
                tracing::warn!(
                    "Duplicate slug {:?} in {}, keeping the first one",
                    record.slug,
                    record.source
                );
            }
            fresh
        })
        .collect()
}

/// Order file names so that, per stem, the preferred extension comes first
fn by_extension_priority(a: &str, b: &str) -> std::cmp::Ordering {
    use crate::content::SourceFormat;
    let split = |name: &str| {
        let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
        let rank = SourceFormat::EXTENSIONS
            .iter()
            .position(|e| *e == ext)
            .unwrap_or(SourceFormat::EXTENSIONS.len());
        (stem.to_string(), rank)
    };
    split(a).cmp(&split(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_priority_prefers_mdx() {
        let mut names = vec!["b.md", "a.md", "a.mdx", "c.mdx"];
        names.sort_by(|a, b| by_extension_priority(a, b));
        assert_eq!(names, vec!["a.mdx", "a.md", "b.md", "c.mdx"]);
    }

    #[test]
    fn test_write_error_messages() {
        assert_eq!(
            WriteError::Validation("Title is required".into()).to_string(),
            "Title is required"
        );
        assert_eq!(
            StoreError::NotFound("x".into()).to_string(),
            "Article not found: x"
        );
    }
}
