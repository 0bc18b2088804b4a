//! Read-write article store on the local filesystem
//!
//! One file per article, `<slug>.mdx` or `<slug>.md`, front matter followed by
//! the body. Filesystem faults never escape as panics or raw I/O errors: reads
//! log and skip, writes return [`WriteError::Storage`], deletes return `false`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use walkdir::WalkDir;

use super::{by_extension_priority, dedupe_slugs, ContentStore, Draft, StoreError, WriteError};
use crate::content::{normalize_tags, slug, ArticleRecord, FrontMatter, ParseContext, SourceFormat};

/// Article store over a directory of Markdown/MDX files
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    dir: PathBuf,
    ctx: ParseContext,
}

/// What an update keeps from the record it replaces
struct Existing {
    path: PathBuf,
    front_matter: FrontMatter,
    date: DateTime<Utc>,
}

impl LocalContentStore {
    pub fn new<P: AsRef<Path>>(dir: P, ctx: ParseContext) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ctx,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every article including unpublished ones, newest first
    pub async fn list_all(&self) -> Vec<ArticleRecord> {
        let dir = self.dir.clone();
        let ctx = self.ctx.clone();
        match tokio::task::spawn_blocking(move || load_all(&dir, &ctx)).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Local article scan did not complete: {}", e);
                Vec::new()
            }
        }
    }

    /// Create or fully replace an article
    pub async fn put(&self, draft: Draft) -> Result<ArticleRecord, WriteError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(WriteError::Validation("Title is required".to_string()));
        }
        if draft.body.trim().is_empty() {
            return Err(WriteError::Validation("Body is required".to_string()));
        }

        let slug = slug::resolve(draft.slug.as_deref(), &title);
        if slug.is_empty() {
            return Err(WriteError::Validation(
                "Title must contain at least one letter or digit".to_string(),
            ));
        }

        let existing = self.existing(&slug).await?;
        let path = existing
            .as_ref()
            .map(|e| e.path.clone())
            .unwrap_or_else(|| self.path_for(&slug, SourceFormat::Mdx));
        let (previous, previous_date) = match existing {
            Some(e) => (e.front_matter, Some(e.date)),
            None => (FrontMatter::default(), None),
        };

        let date = draft.date.or(previous_date).unwrap_or_else(Utc::now);
        let front_matter = FrontMatter {
            title: Some(title),
            slug: Some(slug.clone()),
            description: draft
                .excerpt
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            excerpt: None,
            date: Some(date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            cover_image: draft.cover_image.filter(|c| !c.trim().is_empty()),
            tags: normalize_tags(draft.tags),
            author: previous.author,
            published: draft.published.unwrap_or(previous.published),
            extra: previous.extra,
        };

        let document = front_matter
            .to_document(&draft.body)
            .map_err(|e| WriteError::Storage(format!("Failed to serialize front matter: {}", e)))?;

        if let Err(e) = self.write_atomic(&path, &document).await {
            tracing::warn!("Failed to write article {:?}: {}", path, e);
            return Err(WriteError::Storage(e.to_string()));
        }
        tracing::info!("Saved article {}", slug);

        ArticleRecord::from_source(&document, &file_name(&path), date, &self.ctx)
            .map_err(|e| WriteError::Storage(e.to_string()))
    }

    /// Remove an article; `false` when there was nothing to remove or removal failed
    pub async fn delete(&self, slug: &str) -> bool {
        if !slug::validate(slug) {
            return false;
        }

        let mut removed = false;
        for format in [SourceFormat::Mdx, SourceFormat::Markdown] {
            match self.remove(&self.path_for(slug, format)).await {
                Ok(true) => removed = true,
                Ok(false) => {}
                Err(()) => return false,
            }
        }
        if removed {
            tracing::info!("Deleted article {}", slug);
            return true;
        }

        // Hand-authored files may declare a slug that differs from their name
        let Some(record) = self.list_all().await.into_iter().find(|r| r.slug == slug) else {
            return false;
        };
        let removed = matches!(self.remove(&self.dir.join(&record.source)).await, Ok(true));
        if removed {
            tracing::info!("Deleted article {} ({})", slug, record.source);
        }
        removed
    }

    fn path_for(&self, slug: &str, format: SourceFormat) -> PathBuf {
        self.dir.join(format!("{}.{}", slug, format.extension()))
    }

    /// `Ok(false)` when the file did not exist
    async fn remove(&self, path: &Path) -> Result<bool, ()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                tracing::warn!("Failed to delete {:?}: {}", path, e);
                Err(())
            }
        }
    }

    async fn write_atomic(&self, path: &Path, document: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(".{}.tmp", file_name(path)));
        tokio::fs::write(&tmp, document).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Read a file by path, `Ok(None)` when it does not exist
    async fn read(&self, path: &Path) -> Result<Option<(String, DateTime<Utc>)>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let modified = tokio::fs::metadata(path)
                    .await
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(Utc::now);
                Ok(Some((raw, modified)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                Err(StoreError::Storage(e.to_string()))
            }
        }
    }

    /// Locate the file for `slug` and parse it
    async fn find(&self, slug: &str) -> Result<Option<(PathBuf, ArticleRecord)>, StoreError> {
        if !slug::validate(slug) {
            return Ok(None);
        }

        for format in [SourceFormat::Mdx, SourceFormat::Markdown] {
            let path = self.path_for(slug, format);
            if let Some((raw, modified)) = self.read(&path).await? {
                let name = file_name(&path);
                let record = ArticleRecord::from_source(&raw, &name, modified, &self.ctx)
                    .map_err(|source| StoreError::MalformedFrontMatter { file: name, source })?;
                if record.slug == slug {
                    return Ok(Some((path, record)));
                }
            }
        }

        Ok(self
            .list_all()
            .await
            .into_iter()
            .find(|r| r.slug == slug)
            .map(|r| (self.dir.join(&r.source), r)))
    }

    async fn existing(&self, slug: &str) -> Result<Option<Existing>, WriteError> {
        let found = match self.find(slug).await {
            Ok(found) => found,
            Err(StoreError::MalformedFrontMatter { file, .. }) => {
                // Overwrite the broken file rather than creating a sibling
                tracing::warn!("Replacing article with malformed front matter: {}", file);
                return Ok(Some(Existing {
                    path: self.dir.join(file),
                    front_matter: FrontMatter::default(),
                    date: Utc::now(),
                }));
            }
            Err(e) => return Err(WriteError::Storage(e.to_string())),
        };

        let Some((path, record)) = found else {
            return Ok(None);
        };
        let front_matter = match self.read(&path).await {
            Ok(Some((raw, _))) => FrontMatter::parse(&raw).map(|(fm, _)| fm).unwrap_or_default(),
            Ok(None) => FrontMatter::default(),
            Err(e) => return Err(WriteError::Storage(e.to_string())),
        };
        Ok(Some(Existing {
            path,
            front_matter,
            date: record.date,
        }))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn list(&self) -> Vec<ArticleRecord> {
        self.list_all()
            .await
            .into_iter()
            .filter(|record| record.published)
            .collect()
    }

    /// Unpublished articles are returned too; the public path filters them
    async fn get(&self, slug: &str) -> Result<ArticleRecord, StoreError> {
        self.find(slug)
            .await?
            .map(|(_, record)| record)
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Is this an article source file
fn is_article_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(SourceFormat::from_extension)
        .is_some()
        && !file_name(path).starts_with('.')
}

/// Scan `dir` and parse every article in it
fn load_all(dir: &Path, ctx: &ParseContext) -> Vec<ArticleRecord> {
    if !dir.exists() {
        return Vec::new();
    }

    let mut names: Vec<String> = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && is_article_file(e.path()))
        .map(|e| file_name(e.path()))
        .collect();
    names.sort_by(|a, b| by_extension_priority(a, b));

    let mut records = Vec::new();
    for name in names {
        let path = dir.join(&name);
        match load_one(&path, &name, ctx) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping article {:?}: {}", path, e),
        }
    }

    let mut records = dedupe_slugs(records);
    ArticleRecord::sort_newest_first(&mut records);
    records
}

fn load_one(path: &Path, name: &str, ctx: &ParseContext) -> Result<ArticleRecord, StoreError> {
    let raw = fs::read_to_string(path).map_err(|e| StoreError::Storage(e.to_string()))?;
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    ArticleRecord::from_source(&raw, name, modified, ctx).map_err(|source| {
        StoreError::MalformedFrontMatter {
            file: name.to_string(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalContentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path().join("posts"), ParseContext::default());
        (dir, store)
    }

    fn write(store: &LocalContentStore, name: &str, content: &str) {
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join(name), content).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let (_dir, store) = store();
        assert!(store.list().await.is_empty());
        assert!(store.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_dir, store) = store();
        let body = "First paragraph.\n\n```rust\nlet x = 1;\n```\n";
        let saved = store
            .put(Draft::new("Hello: A \"Quoted\" World", body))
            .await
            .unwrap();
        assert_eq!(saved.slug, "hello-a-quoted-world");
        assert!(store.dir().join("hello-a-quoted-world.mdx").exists());

        let fetched = store.get("hello-a-quoted-world").await.unwrap();
        assert_eq!(fetched.title, "Hello: A \"Quoted\" World");
        assert_eq!(fetched.body, body);
        assert_eq!(fetched, saved);
    }

    #[tokio::test]
    async fn test_reading_time_recomputed_on_update() {
        let (_dir, store) = store();
        store.put(Draft::new("Post", "short body")).await.unwrap();
        assert_eq!(store.get("post").await.unwrap().reading_time, "1 min read");

        let long_body = vec!["word"; 450].join(" ");
        store.put(Draft::new("Post", long_body.clone())).await.unwrap();
        let updated = store.get("post").await.unwrap();
        assert_eq!(updated.body, long_body);
        assert_eq!(updated.reading_time, "3 min read");
    }

    #[tokio::test]
    async fn test_update_preserves_date_unless_overridden() {
        let (_dir, store) = store();
        let created = store.put(Draft::new("Dated", "v1")).await.unwrap();

        let updated = store.put(Draft::new("Dated", "v2")).await.unwrap();
        assert_eq!(updated.date, created.date);

        let explicit = Utc.with_ymd_and_hms(2020, 5, 17, 12, 0, 0).unwrap();
        let overridden = store
            .put(Draft {
                date: Some(explicit),
                ..Draft::new("Dated", "v3")
            })
            .await
            .unwrap();
        assert_eq!(overridden.date, explicit);
        assert_eq!(store.get("dated").await.unwrap().date, explicit);
    }

    #[tokio::test]
    async fn test_update_keeps_unknown_keys_and_author() {
        let (_dir, store) = store();
        write(
            &store,
            "kept.md",
            "---\ntitle: Kept\nauthor: Guest Writer\nseries: notes\n---\nold",
        );

        let updated = store.put(Draft::new("Kept", "new body")).await.unwrap();
        assert_eq!(updated.author, "Guest Writer");
        assert_eq!(updated.source, "kept.md");
        assert!(updated.extra.contains_key("series"));
        assert!(!store.dir().join("kept.mdx").exists());
    }

    #[tokio::test]
    async fn test_explicit_slug_wins_when_valid() {
        let (_dir, store) = store();
        let saved = store
            .put(Draft {
                slug: Some("custom".to_string()),
                ..Draft::new("Some Title", "body")
            })
            .await
            .unwrap();
        assert_eq!(saved.slug, "custom");

        let fallback = store
            .put(Draft {
                slug: Some("Bad Slug!".to_string()),
                ..Draft::new("Other Title", "body")
            })
            .await
            .unwrap();
        assert_eq!(fallback.slug, "other-title");
    }

    #[tokio::test]
    async fn test_put_validation() {
        let (_dir, store) = store();
        assert_eq!(
            store.put(Draft::new("   ", "body")).await.unwrap_err(),
            WriteError::Validation("Title is required".to_string())
        );
        assert_eq!(
            store.put(Draft::new("Title", "\n ")).await.unwrap_err(),
            WriteError::Validation("Body is required".to_string())
        );
        assert!(matches!(
            store.put(Draft::new("???", "body")).await,
            Err(WriteError::Validation(_))
        ));
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn test_list_filters_unpublished_and_sorts() {
        let (_dir, store) = store();
        write(&store, "b.md", "---\ntitle: B\ndate: 2024-01-01\n---\nb");
        write(&store, "a.md", "---\ntitle: A\ndate: 2024-01-01\n---\na");
        write(&store, "new.mdx", "---\ntitle: New\ndate: 2024-03-01\n---\nn");
        write(
            &store,
            "draft.md",
            "---\ntitle: Draft\ndate: 2025-01-01\npublished: false\n---\nd",
        );
        write(&store, "notes.txt", "not an article");

        let slugs: Vec<_> = store.list().await.into_iter().map(|r| r.slug).collect();
        assert_eq!(slugs, vec!["new", "a", "b"]);

        let all: Vec<_> = store.list_all().await.into_iter().map(|r| r.slug).collect();
        assert_eq!(all, vec!["draft", "new", "a", "b"]);

        // Unpublished records stay reachable for the admin
        assert!(!store.get("draft").await.unwrap().published);
    }

    #[tokio::test]
    async fn test_malformed_file_skipped_in_list_but_reported_on_get() {
        let (_dir, store) = store();
        write(&store, "good.md", "---\ntitle: Good\n---\nok");
        write(&store, "fine.md", "no front matter at all");
        write(&store, "broken.md", "---\ntitle: Broken\nnever closed");

        let records = store.list().await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.slug != "broken"));

        assert!(matches!(
            store.get("broken").await,
            Err(StoreError::MalformedFrontMatter { .. })
        ));
    }

    #[tokio::test]
    async fn test_title_without_slug_characters_is_skipped() {
        let (_dir, store) = store();
        write(&store, "日本語.md", "---\ntitle: 日本語\n---\nbody");
        write(&store, "kana.md", "---\ntitle: ひらがな\n---\nbody");
        write(&store, "named.md", "---\ntitle: 日本語\nslug: nihongo\n---\nbody");

        let mut slugs: Vec<_> = store.list().await.into_iter().map(|r| r.slug).collect();
        slugs.sort();
        assert_eq!(slugs, vec!["kana", "nihongo"]);
        assert!(slugs.iter().all(|s| slug::validate(s)));
    }

    #[tokio::test]
    async fn test_mdx_preferred_over_md() {
        let (_dir, store) = store();
        write(&store, "twin.md", "---\ntitle: From md\n---\nmd");
        write(&store, "twin.mdx", "---\ntitle: From mdx\n---\nmdx");

        assert_eq!(store.get("twin").await.unwrap().title, "From mdx");
        let all = store.list_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "From mdx");
    }

    #[tokio::test]
    async fn test_get_by_front_matter_slug() {
        let (_dir, store) = store();
        write(&store, "2024-01-01-notes.md", "---\ntitle: Notes\nslug: notes\n---\nbody");
        assert_eq!(store.get("notes").await.unwrap().source, "2024-01-01-notes.md");
        assert!(matches!(
            store.get("2024-01-01-notes").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.delete("notes").await);
        assert!(!store.dir().join("2024-01-01-notes.md").exists());
    }

    #[tokio::test]
    async fn test_get_missing_and_invalid_slugs() {
        let (_dir, store) = store();
        assert_eq!(
            store.get("nope").await.unwrap_err(),
            StoreError::NotFound("nope".to_string())
        );
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, store) = store();
        assert!(!store.delete("missing").await);

        store.put(Draft::new("Doomed", "body")).await.unwrap();
        assert!(store.delete("doomed").await);
        assert!(!store.delete("doomed").await);
        assert!(matches!(
            store.get("doomed").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
