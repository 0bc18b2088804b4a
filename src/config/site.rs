//! Site configuration (_config.yml)

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding `remote.token`
pub const REMOTE_TOKEN_ENV: &str = "QUILL_REMOTE_TOKEN";
/// Environment variable overriding `admin.password`
pub const ADMIN_PASSWORD_ENV: &str = "QUILL_ADMIN_PASSWORD";

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub description: String,
    pub author: String,
    pub url: String,
    pub timezone: String,

    // Directory
    pub posts_dir: String,
    pub public_dir: String,

    // Content
    /// Which store backs the public blog
    pub source: ContentSource,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub highlight: HighlightConfig,
    #[serde(default)]
    pub reading: ReadingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Quill".to_string(),
            description: String::new(),
            author: "Site Owner".to_string(),
            url: "http://localhost:4000".to_string(),
            timezone: "UTC".to_string(),

            posts_dir: "content/posts".to_string(),
            public_dir: "public".to_string(),

            source: ContentSource::Remote,
            remote: RemoteConfig::default(),
            cache: CacheConfig::default(),
            highlight: HighlightConfig::default(),
            reading: ReadingConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: SiteConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    }

    /// Fill secrets from the environment when set
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(REMOTE_TOKEN_ENV) {
            if !token.is_empty() {
                self.remote.token = Some(token);
            }
        }
        if let Ok(password) = std::env::var(ADMIN_PASSWORD_ENV) {
            if !password.is_empty() {
                self.admin.password = Some(password);
            }
        }
    }

    /// Time zone used for naive front-matter dates, UTC when unknown
    pub fn timezone(&self) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!("Unknown timezone {:?}, using UTC", self.timezone);
                chrono_tz::UTC
            }
        }
    }
}

/// Store backing the public blog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Remote,
    Local,
}

/// Remote content repository (GitHub-compatible contents API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub api_url: String,
    pub raw_url: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository holding the articles
    pub path: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            raw_url: "https://raw.githubusercontent.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            path: "posts".to_string(),
            token: None,
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Revalidation window for public reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Code highlighting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub theme: String,
    pub line_number: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            theme: "base16-ocean.dark".to_string(),
            line_number: true,
        }
    }
}

/// Reading time and excerpt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub words_per_minute: usize,
    pub excerpt_length: usize,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            words_per_minute: crate::content::reading_time::WORDS_PER_MINUTE,
            excerpt_length: 160,
        }
    }
}

/// Admin session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub password: Option<String>,
    pub session_ttl_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: None,
            session_ttl_secs: 24 * 60 * 60,
        }
    }
}
