//! Article model shared by both content stores

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::Serialize;

use super::frontmatter::{FrontMatter, FrontMatterError};
use super::markdown::{self, SourceFormat};
use super::{reading_time, slug};
use crate::config::SiteConfig;
use crate::helpers::truncate;

/// Site-wide defaults applied while building records
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub timezone: Tz,
    pub default_author: String,
    pub words_per_minute: usize,
    pub excerpt_length: usize,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::UTC,
            default_author: "Anonymous".to_string(),
            words_per_minute: reading_time::WORDS_PER_MINUTE,
            excerpt_length: 160,
        }
    }
}

impl ParseContext {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            timezone: config.timezone(),
            default_author: config.author.clone(),
            words_per_minute: config.reading.words_per_minute,
            excerpt_length: config.reading.excerpt_length,
        }
    }
}

/// One blog article
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    /// Unique, URL-safe identifier within a store
    pub slug: String,
    pub title: String,
    /// Raw Markdown/MDX body, front matter removed
    pub body: String,
    /// Author-supplied or derived from the body
    pub description: String,
    pub date: DateTime<Utc>,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub author: String,
    pub published: bool,
    /// Always derived from `body`, never read from storage
    pub reading_time: String,
    pub format: SourceFormat,
    /// File name the record was read from
    pub source: String,
    /// Front-matter keys this crate does not interpret
    #[serde(skip)]
    pub extra: IndexMap<String, serde_yaml::Value>,
}

/// Listing view of an article: everything but the body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMeta {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub cover_image: Option<String>,
    pub tags: Vec<String>,
    pub author: String,
    pub published: bool,
    pub reading_time: String,
}

impl From<&ArticleRecord> for ArticleMeta {
    fn from(record: &ArticleRecord) -> Self {
        Self {
            slug: record.slug.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            date: record.date,
            cover_image: record.cover_image.clone(),
            tags: record.tags.clone(),
            author: record.author.clone(),
            published: record.published,
            reading_time: record.reading_time.clone(),
        }
    }
}

impl ArticleRecord {
    /// Build a record from the raw text of `file_name`.
    ///
    /// `fallback_date` is used when the front matter has no readable date.
    pub fn from_source(
        raw: &str,
        file_name: &str,
        fallback_date: DateTime<Utc>,
        ctx: &ParseContext,
    ) -> Result<Self, FrontMatterError> {
        let (fm, body) = FrontMatter::parse(raw)?;

        let path = Path::new(file_name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(SourceFormat::from_extension)
            .unwrap_or(SourceFormat::Markdown);

        let title = fm
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or(Some(stem).filter(|s| !s.is_empty()))
            .unwrap_or("Untitled")
            .to_string();

        let slug = match fm.slug.as_deref().map(str::trim) {
            Some(explicit) if slug::validate(explicit) => explicit.to_string(),
            _ if slug::validate(stem) => stem.to_string(),
            _ => slug::generate(&title),
        };
        if !slug::validate(&slug) {
            return Err(FrontMatterError::MissingSlug(title));
        }

        let description = match fm.summary() {
            Some(summary) => summary.to_string(),
            None => derive_description(body, ctx.excerpt_length),
        };

        let date = fm.parse_date(ctx.timezone).unwrap_or(fallback_date);
        let author = fm
            .author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(ctx.default_author.as_str())
            .to_string();

        Ok(Self {
            slug,
            title,
            body: body.to_string(),
            description,
            date,
            cover_image: fm.cover_image.filter(|c| !c.trim().is_empty()),
            tags: normalize_tags(fm.tags),
            author,
            published: fm.published,
            reading_time: reading_time::estimate_with_speed(body, ctx.words_per_minute),
            format,
            source: file_name.to_string(),
            extra: fm.extra,
        })
    }

    /// Listing view without the body
    pub fn meta(&self) -> ArticleMeta {
        ArticleMeta::from(self)
    }

    /// Front matter that reproduces this record when written to storage
    pub fn to_front_matter(&self) -> FrontMatter {
        FrontMatter {
            title: Some(self.title.clone()),
            slug: Some(self.slug.clone()),
            description: Some(self.description.clone()).filter(|d| !d.is_empty()),
            excerpt: None,
            date: Some(self.date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            cover_image: self.cover_image.clone(),
            tags: self.tags.clone(),
            author: Some(self.author.clone()),
            published: self.published,
            extra: self.extra.clone(),
        }
    }

    /// Sort newest first; equal dates fall back to slug order
    pub fn sort_newest_first(records: &mut [ArticleRecord]) {
        records.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug)));
    }
}

/// Trim tags, drop empty ones and collapse duplicates, keeping first-seen order
pub fn normalize_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t: &String| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}

/// Excerpt from the `more` marker if present, otherwise the leading text
fn derive_description(body: &str, length: usize) -> String {
    let source = markdown::split_excerpt(body).unwrap_or(body);
    truncate(&markdown::plain_text(source), length, Some("…"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        DateTime::UNIX_EPOCH
    }

    #[test]
    fn test_from_source_full_front_matter() {
        let raw = r#"---
title: Shipping a Rust Blog
slug: rust-blog
description: How the blog works
date: 2024-02-10
coverImage: /img/cover.png
tags: [rust, web, rust]
author: Sam
published: false
---
Body text here.
"#;
        let record =
            ArticleRecord::from_source(raw, "whatever.mdx", epoch(), &ParseContext::default())
                .unwrap();

        assert_eq!(record.slug, "rust-blog");
        assert_eq!(record.title, "Shipping a Rust Blog");
        assert_eq!(record.description, "How the blog works");
        assert_eq!(record.date, Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap());
        assert_eq!(record.cover_image.as_deref(), Some("/img/cover.png"));
        assert_eq!(record.tags, vec!["rust", "web"]);
        assert_eq!(record.author, "Sam");
        assert!(!record.published);
        assert_eq!(record.reading_time, "1 min read");
        assert_eq!(record.format, SourceFormat::Mdx);
        assert_eq!(record.body, "Body text here.\n");
    }

    #[test]
    fn test_defaults_without_front_matter() {
        let ctx = ParseContext {
            default_author: "Site Owner".to_string(),
            ..Default::default()
        };
        let record =
            ArticleRecord::from_source("Just a body.", "hello-world.md", epoch(), &ctx).unwrap();

        assert_eq!(record.title, "hello-world");
        assert_eq!(record.slug, "hello-world");
        assert_eq!(record.author, "Site Owner");
        assert_eq!(record.date, epoch());
        assert!(record.published);
        assert_eq!(record.description, "Just a body.");
        assert_eq!(record.format, SourceFormat::Markdown);
    }

    #[test]
    fn test_invalid_slug_falls_back() {
        let raw = "---\ntitle: Hello There\nslug: Not A Slug\n---\nbody";
        let record =
            ArticleRecord::from_source(raw, "Draft Copy.md", epoch(), &ParseContext::default())
                .unwrap();
        assert_eq!(record.slug, "hello-there");
    }

    #[test]
    fn test_unusable_slug_is_an_error() {
        let raw = "---\ntitle: 日本語\n---\nbody";
        let err = ArticleRecord::from_source(raw, "日本語.md", epoch(), &ParseContext::default())
            .unwrap_err();
        assert_eq!(err, FrontMatterError::MissingSlug("日本語".to_string()));

        // Falls back to a usable stem before giving up
        let record =
            ArticleRecord::from_source(raw, "nihongo.md", epoch(), &ParseContext::default())
                .unwrap();
        assert_eq!(record.slug, "nihongo");
    }

    #[test]
    fn test_unterminated_front_matter_propagates() {
        let err = ArticleRecord::from_source(
            "---\ntitle: Oops\n",
            "oops.md",
            epoch(),
            &ParseContext::default(),
        )
        .unwrap_err();
        assert_eq!(err, FrontMatterError::Unterminated);
    }

    #[test]
    fn test_derived_description_is_truncated() {
        let ctx = ParseContext {
            excerpt_length: 20,
            ..Default::default()
        };
        let raw = "---\ntitle: T\n---\n# Heading\n\nA **long** paragraph that keeps going and going.";
        let record = ArticleRecord::from_source(raw, "t.md", epoch(), &ctx).unwrap();
        assert_eq!(record.description, "Heading A long para…");
    }

    #[test]
    fn test_description_from_more_marker() {
        let raw = "---\ntitle: T\n---\nIntro *only*.\n\n<!-- more -->\n\nThe rest.";
        let record =
            ArticleRecord::from_source(raw, "t.md", epoch(), &ParseContext::default()).unwrap();
        assert_eq!(record.description, "Intro only.");
    }

    #[test]
    fn test_sort_newest_first_with_slug_tiebreak() {
        let ctx = ParseContext::default();
        let make = |name: &str, date: &str| {
            let raw = format!("---\ntitle: {name}\ndate: {date}\n---\nbody");
            ArticleRecord::from_source(&raw, &format!("{name}.md"), epoch(), &ctx).unwrap()
        };
        let mut records = vec![
            make("bravo", "2024-01-01"),
            make("alpha", "2024-01-01"),
            make("newest", "2024-06-01"),
            make("oldest", "2023-01-01"),
        ];
        ArticleRecord::sort_newest_first(&mut records);
        let slugs: Vec<_> = records.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["newest", "alpha", "bravo", "oldest"]);
    }

    #[test]
    fn test_front_matter_round_trip() {
        let raw = "---\ntitle: Round Trip\ndate: 2024-04-04T10:00:00Z\ntags: [a]\nseries: one\n---\nBody";
        let ctx = ParseContext::default();
        let record = ArticleRecord::from_source(raw, "round-trip.mdx", epoch(), &ctx).unwrap();

        let document = record.to_front_matter().to_document(&record.body).unwrap();
        let again = ArticleRecord::from_source(&document, "round-trip.mdx", epoch(), &ctx).unwrap();
        assert_eq!(again, record);
    }
}
