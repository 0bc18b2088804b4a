//! Read-only article store backed by a remote content repository
//!
//! Talks to a GitHub-compatible contents API. Transport problems never reach
//! the caller as hard failures: a failed listing is an empty blog, a failed
//! fetch is a missing article, and both are logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::task::JoinSet;

use super::{by_extension_priority, dedupe_slugs, ContentStore, StoreError};
use crate::config::RemoteConfig;
use crate::content::{slug, ArticleRecord, ParseContext, SourceFormat};

/// Characters left alone inside one URL path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// One entry of a contents API directory listing
#[derive(Debug, Clone, Deserialize)]
struct RemoteEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    download_url: Option<String>,
}

/// Article store over a remote repository directory
#[derive(Debug, Clone)]
pub struct RemoteContentStore {
    client: reqwest::Client,
    config: RemoteConfig,
    ctx: ParseContext,
}

impl RemoteContentStore {
    pub fn new(config: RemoteConfig, ctx: ParseContext) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| StoreError::Transport(format!("Invalid token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("quill-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            config,
            ctx,
        })
    }

    /// Repository directory as `owner/repo@branch:path`
    pub fn location(&self) -> String {
        format!(
            "{}/{}@{}:{}",
            self.config.owner, self.config.repo, self.config.branch, self.config.path
        )
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.config.api_url.trim_end_matches('/'),
            encode_segment(&self.config.owner),
            encode_segment(&self.config.repo),
            encode_path(&self.config.path),
            encode_segment(&self.config.branch)
        )
    }

    fn raw_url(&self, name: &str) -> String {
        let dir = encode_path(&self.config.path);
        let mut url = format!(
            "{}/{}/{}/{}/",
            self.config.raw_url.trim_end_matches('/'),
            encode_segment(&self.config.owner),
            encode_segment(&self.config.repo),
            encode_segment(&self.config.branch)
        );
        if !dir.is_empty() {
            url.push_str(&dir);
            url.push('/');
        }
        url.push_str(&encode_segment(name));
        url
    }

    /// GET `url` as text. A 404 is `NotFound`, every other failure `Transport`.
    async fn fetch_text(&self, url: &str, accept: &'static str) -> Result<String, StoreError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .text()
                .await
                .map_err(|e| StoreError::Transport(e.to_string())),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(url.to_string())),
            status => Err(StoreError::Transport(format!("{} returned {}", url, status))),
        }
    }

    async fn list_entries(&self) -> Result<Vec<RemoteEntry>, StoreError> {
        let body = self
            .fetch_text(&self.contents_url(), "application/vnd.github+json")
            .await?;
        serde_json::from_str(&body)
            .map_err(|e| StoreError::Transport(format!("Unexpected listing payload: {}", e)))
    }

    async fn fetch_record(&self, name: &str, url: &str) -> Result<ArticleRecord, StoreError> {
        let raw = self.fetch_text(url, "text/plain").await?;
        ArticleRecord::from_source(&raw, name, DateTime::<Utc>::UNIX_EPOCH, &self.ctx).map_err(
            |source| StoreError::MalformedFrontMatter {
                file: name.to_string(),
                source,
            },
        )
    }
}

#[async_trait]
impl ContentStore for RemoteContentStore {
    async fn list(&self) -> Vec<ArticleRecord> {
        let entries = match self.list_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to list remote articles at {}: {}", self.location(), e);
                return Vec::new();
            }
        };

        let mut entries: Vec<RemoteEntry> = entries
            .into_iter()
            .filter(|entry| entry.kind == "file")
            .filter(|entry| {
                entry
                    .name
                    .rsplit_once('.')
                    .and_then(|(_, ext)| SourceFormat::from_extension(ext))
                    .is_some()
            })
            .collect();
        entries.sort_by(|a, b| by_extension_priority(&a.name, &b.name));

        let mut tasks = JoinSet::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let store = self.clone();
            tasks.spawn(async move {
                let url = entry
                    .download_url
                    .clone()
                    .unwrap_or_else(|| store.raw_url(&entry.name));
                (index, entry.name.clone(), store.fetch_record(&entry.name, &url).await)
            });
        }

        let mut fetched = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(record))) => fetched.push((index, record)),
                Ok((_, name, Err(e))) => {
                    tracing::warn!("Skipping remote article {}: {}", name, e);
                }
                Err(e) => tracing::error!("Remote fetch task failed: {}", e),
            }
        }

        // Restore listing order so duplicate slugs resolve the same way every time
        fetched.sort_by_key(|(index, _)| *index);
        let mut records = dedupe_slugs(fetched.into_iter().map(|(_, r)| r).collect());
        ArticleRecord::sort_newest_first(&mut records);
        records
    }

    async fn get(&self, slug: &str) -> Result<ArticleRecord, StoreError> {
        if !slug::validate(slug) {
            return Err(StoreError::NotFound(slug.to_string()));
        }

        for ext in SourceFormat::EXTENSIONS {
            let name = format!("{}.{}", slug, ext);
            match self.fetch_record(&name, &self.raw_url(&name)).await {
                Ok(record) if record.slug == slug => return Ok(record),
                Ok(record) => {
                    tracing::debug!("{} declares slug {:?}, not {:?}", name, record.slug, slug)
                }
                Err(e @ StoreError::MalformedFrontMatter { .. }) => return Err(e),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => tracing::warn!("Failed to fetch remote article {}: {}", name, e),
            }
        }

        // Slug set in front matter or derived from the title
        self.list()
            .await
            .into_iter()
            .find(|record| record.slug == slug)
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))
    }
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}
