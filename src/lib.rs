//! quill-rs: content pipeline for a personal blog
//!
//! Articles are Markdown/MDX files with YAML front matter. The public blog
//! reads them from a remote content repository (or a local directory) through
//! a revalidating cache; an admin surface writes them to a local directory.

pub mod auth;
pub mod cache;
pub mod commands;
pub mod config;
pub mod content;
pub mod helpers;
pub mod server;
pub mod store;

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

use auth::{PasswordSessions, SessionGate};
use cache::RevalidatingCache;
use config::{ContentSource, SiteConfig};
use content::{tags, ArticleMeta, ArticleRecord, MarkdownRenderer, ParseContext, Rendered};
use store::{ContentStore, Draft, LocalContentStore, RemoteContentStore, Store, StoreError, WriteError};

/// Cache key for the full public listing
const LIST_KEY: &str = "list";

/// Errors from the admin surface
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The blog application
pub struct Blog {
    /// Site configuration
    pub config: SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Static front end served next to the API
    pub public_dir: PathBuf,
    store: Store,
    admin_store: LocalContentStore,
    renderer: MarkdownRenderer,
    list_cache: RevalidatingCache<Vec<ArticleRecord>>,
    article_cache: RevalidatingCache<Result<ArticleRecord, StoreError>>,
    sessions: Box<dyn SessionGate>,
}

impl Blog {
    /// Create a blog from a directory holding `_config.yml`
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join("_config.yml");

        let mut config = if config_path.exists() {
            SiteConfig::load(&config_path)?
        } else {
            SiteConfig::default()
        };
        config.apply_env();

        let ctx = ParseContext::from_config(&config);
        let store = match config.source {
            ContentSource::Remote => {
                if config.remote.owner.is_empty() || config.remote.repo.is_empty() {
                    tracing::warn!("remote.owner / remote.repo not set, the blog will be empty");
                }
                Store::Remote(RemoteContentStore::new(config.remote.clone(), ctx)?)
            }
            ContentSource::Local => {
                Store::Local(LocalContentStore::new(base_dir.join(&config.posts_dir), ctx))
            }
        };
        let sessions = Box::new(PasswordSessions::from_config(&config.admin));

        Ok(Self::with_parts(config, base_dir, store, sessions))
    }

    /// Assemble a blog from already constructed collaborators
    pub fn with_parts(
        config: SiteConfig,
        base_dir: PathBuf,
        store: Store,
        sessions: Box<dyn SessionGate>,
    ) -> Self {
        let ctx = ParseContext::from_config(&config);
        let admin_store = match &store {
            Store::Local(local) => local.clone(),
            Store::Remote(_) => LocalContentStore::new(base_dir.join(&config.posts_dir), ctx),
        };
        let renderer =
            MarkdownRenderer::with_options(&config.highlight.theme, config.highlight.line_number);
        let ttl = config.cache.ttl();
        let public_dir = base_dir.join(&config.public_dir);

        tracing::debug!(
            "Public blog reads from the {} store, admin writes to {:?}",
            store.kind(),
            admin_store.dir()
        );

        Self {
            config,
            base_dir,
            public_dir,
            store,
            admin_store,
            renderer,
            list_cache: RevalidatingCache::new(ttl),
            article_cache: RevalidatingCache::new(ttl),
            sessions,
        }
    }

    /// Store behind the public blog
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Store behind the admin surface
    pub fn admin_store(&self) -> &LocalContentStore {
        &self.admin_store
    }

    /// Published articles, newest first, through the cache
    pub async fn published_records(&self) -> Vec<ArticleRecord> {
        self.list_cache
            .get_or_refresh(LIST_KEY, || self.store.list())
            .await
            .into_iter()
            .filter(|record| record.published)
            .collect()
    }

    /// Listing payload: published articles without their bodies
    pub async fn list_published(&self) -> Vec<ArticleMeta> {
        self.published_records()
            .await
            .iter()
            .map(ArticleRecord::meta)
            .collect()
    }

    /// One published article
    pub async fn get_by_slug(&self, slug: &str) -> Result<ArticleRecord, StoreError> {
        let record = self
            .article_cache
            .get_or_refresh(&article_key(slug), || self.store.get(slug))
            .await?;
        if record.published {
            Ok(record)
        } else {
            Err(StoreError::NotFound(slug.to_string()))
        }
    }

    /// One published article with its compiled body
    pub async fn render_by_slug(&self, slug: &str) -> Result<(ArticleRecord, Rendered), StoreError> {
        let record = self.get_by_slug(slug).await?;
        let rendered = self.render(&record);
        Ok((record, rendered))
    }

    /// Compile a record's body; never fails, see [`Rendered::Fallback`]
    pub fn render(&self, record: &ArticleRecord) -> Rendered {
        self.renderer
            .compile(&record.body, record.format, &record.description)
    }

    /// Every tag used by a published article, sorted
    pub async fn all_tags(&self) -> Vec<String> {
        tags::all_tags(&self.published_records().await)
    }

    /// Published articles carrying `tag`, newest first
    pub async fn by_tag(&self, tag: &str) -> Vec<ArticleMeta> {
        let records = self.published_records().await;
        tags::by_tag(&records, tag)
            .into_iter()
            .map(ArticleRecord::meta)
            .collect()
    }

    /// Exchange the admin password for a session token
    pub fn login(&self, password: &str) -> Option<String> {
        self.sessions.create_session(password)
    }

    fn authorize(&self, token: &str) -> Result<(), AdminError> {
        if self.sessions.is_authenticated(token) {
            Ok(())
        } else {
            Err(AdminError::Unauthorized)
        }
    }

    /// Every local article, drafts included
    pub async fn admin_list(&self, token: &str) -> Result<Vec<ArticleMeta>, AdminError> {
        self.authorize(token)?;
        Ok(self
            .admin_store
            .list_all()
            .await
            .iter()
            .map(ArticleRecord::meta)
            .collect())
    }

    pub async fn admin_get(&self, token: &str, slug: &str) -> Result<ArticleRecord, AdminError> {
        self.authorize(token)?;
        Ok(self.admin_store.get(slug).await?)
    }

    /// Write a new article; an existing slug is rejected
    pub async fn create(&self, token: &str, draft: Draft) -> Result<ArticleRecord, AdminError> {
        self.authorize(token)?;
        let slug = content::slug::resolve(draft.slug.as_deref(), &draft.title);
        if !slug.is_empty() && self.admin_store.get(&slug).await.is_ok() {
            return Err(WriteError::Validation(format!(
                "An article with slug \"{}\" already exists",
                slug
            ))
            .into());
        }

        let record = self.admin_store.put(draft).await?;
        self.after_write(&record.slug);
        tracing::info!("Created article {}", record.slug);
        Ok(record)
    }

    /// Replace the article at `slug`. A different valid slug in the draft renames it.
    pub async fn update(
        &self,
        token: &str,
        slug: &str,
        mut draft: Draft,
    ) -> Result<ArticleRecord, AdminError> {
        self.authorize(token)?;
        let current = self.admin_store.get(slug).await?;

        let target = draft
            .slug
            .as_deref()
            .filter(|s| content::slug::validate(s))
            .map(str::to_string)
            .unwrap_or_else(|| current.slug.clone());
        if target != current.slug {
            if self.admin_store.get(&target).await.is_ok() {
                return Err(WriteError::Validation(format!(
                    "An article with slug \"{}\" already exists",
                    target
                ))
                .into());
            }
            if draft.date.is_none() {
                draft.date = Some(current.date);
            }
        }
        draft.slug = Some(target.clone());

        let record = self.admin_store.put(draft).await?;
        if record.slug != current.slug && !self.admin_store.delete(&current.slug).await {
            tracing::warn!("Renamed {} to {} but the old file remains", current.slug, record.slug);
        }
        self.after_write(&current.slug);
        self.after_write(&record.slug);
        tracing::info!("Updated article {}", record.slug);
        Ok(record)
    }

    /// Remove an article; `false` when there was nothing to remove
    pub async fn delete(&self, token: &str, slug: &str) -> Result<bool, AdminError> {
        self.authorize(token)?;
        let deleted = self.admin_store.delete(slug).await;
        if deleted {
            self.after_write(slug);
            tracing::info!("Deleted article {}", slug);
        }
        Ok(deleted)
    }

    /// Local writes are visible to the public blog only when it reads the local store
    fn after_write(&self, slug: &str) {
        if matches!(self.store, Store::Local(_)) {
            self.list_cache.invalidate(LIST_KEY);
            self.article_cache.invalidate(&article_key(slug));
        }
    }
}

fn article_key(slug: &str) -> String {
    format!("article:{}", slug)
}
