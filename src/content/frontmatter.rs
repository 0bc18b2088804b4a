//! Front-matter parsing and serialization

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Delimiter line that opens and closes a front-matter block
const DELIMITER: &str = "---";

/// Errors raised while splitting front matter from a body
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrontMatterError {
    #[error("Front matter opened with `---` but never closed")]
    Unterminated,

    #[error("No usable slug for {0:?}; set `slug` in the front matter")]
    MissingSlug(String),
}

/// Accept any scalar as a string, ignore anything else
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value))
}

/// Accept booleans and the usual yes/no spellings; anything else keeps the default
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    };
    Ok(parsed.unwrap_or_else(default_published))
}

/// Handles a single string, a comma-separated string, or a list of scalars
fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let tags = match value {
        Value::String(s) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
        _ => Vec::new(),
    };
    Ok(tags)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Front-matter data from an article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    #[serde(deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub slug: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub excerpt: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(
        rename = "coverImage",
        alias = "cover_image",
        alias = "image",
        deserialize_with = "lenient_string"
    )]
    pub cover_image: Option<String>,
    #[serde(deserialize_with = "string_or_vec")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub author: Option<String>,
    /// Articles are published unless they say otherwise
    #[serde(deserialize_with = "lenient_bool")]
    pub published: bool,

    /// Keys this crate does not interpret, kept in file order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn default_published() -> bool {
    true
}

impl Default for FrontMatter {
    fn default() -> Self {
        Self {
            title: None,
            slug: None,
            description: None,
            excerpt: None,
            date: None,
            cover_image: None,
            tags: Vec::new(),
            author: None,
            published: default_published(),
            extra: IndexMap::new(),
        }
    }
}

/// Split raw text into the YAML block (if any) and the body.
///
/// The block must start on the first non-blank line with a `---` line and end
/// with another `---` line. One blank line after the closing delimiter belongs
/// to the delimiter, not the body.
pub fn split(content: &str) -> Result<(Option<&str>, &str), FrontMatterError> {
    let start = content.trim_start_matches(['\n', '\r']);

    let after_open = match start.split_once('\n') {
        Some((first, rest)) if first.trim_end() == DELIMITER => rest,
        None if start.trim_end() == DELIMITER => "",
        _ => return Ok((None, content)),
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let yaml = &after_open[..offset];
            let rest = &after_open[offset + line.len()..];
            let body = rest
                .strip_prefix("\r\n")
                .or_else(|| rest.strip_prefix('\n'))
                .unwrap_or(rest);
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }

    Err(FrontMatterError::Unterminated)
}

/// Whether a delimited block reads like `key: value` metadata rather than a
/// Markdown thematic break followed by prose
fn has_yaml_structure(block: &str) -> bool {
    block.lines().any(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return false;
        }
        let Some(colon_pos) = trimmed.find(':') else {
            return false;
        };
        let key = &trimmed[..colon_pos];
        let is_valid_key = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && !matches!(key, "http" | "https" | "ftp");
        let after_colon = &trimmed[colon_pos + 1..];
        is_valid_key && (after_colon.is_empty() || after_colon.starts_with(' '))
    })
}

impl FrontMatter {
    /// Parse front-matter from content string
    /// Returns (front_matter, body)
    pub fn parse(content: &str) -> Result<(Self, &str), FrontMatterError> {
        let (block, body) = split(content)?;

        let Some(yaml) = block else {
            return Ok((Self::default(), body));
        };

        if yaml.trim().is_empty() {
            return Ok((Self::default(), body));
        }

        if !has_yaml_structure(yaml) {
            // A leading `---` rule followed by prose, not metadata
            return Ok((Self::default(), content));
        }

        match serde_yaml::from_str::<Value>(yaml) {
            Ok(Value::Mapping(mapping)) => Ok((Self::from_mapping(mapping), body)),
            Ok(_) => {
                tracing::warn!("Front matter is not a key/value mapping, ignoring it");
                Ok((Self::default(), body))
            }
            Err(e) => {
                tracing::warn!("Failed to parse YAML front matter, ignoring it: {}", e);
                Ok((Self::default(), body))
            }
        }
    }

    fn from_mapping(mapping: Mapping) -> Self {
        match serde_yaml::from_value::<FrontMatter>(Value::Mapping(mapping.clone())) {
            Ok(fm) => fm,
            Err(e) => {
                tracing::warn!("Front matter fields could not be read, keeping them raw: {}", e);
                let extra = mapping
                    .into_iter()
                    .filter_map(|(k, v)| scalar_to_string(&k).map(|k| (k, v)))
                    .collect();
                Self {
                    extra,
                    ..Self::default()
                }
            }
        }
    }

    /// Author-supplied summary, under either of its accepted keys
    pub fn summary(&self) -> Option<&str> {
        self.description
            .as_deref()
            .or(self.excerpt.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Parse the date string, reading naive values in `tz`
    pub fn parse_date(&self, tz: Tz) -> Option<DateTime<Utc>> {
        self.date.as_deref().and_then(|s| parse_date_string(s, tz))
    }

    /// Render this front matter and `body` back into a storable document
    pub fn to_document(&self, body: &str) -> Result<String, serde_yaml::Error> {
        let mut mapping = Mapping::new();
        let mut put = |key: &str, value: Value| {
            mapping.insert(Value::String(key.to_string()), value);
        };

        if let Some(title) = &self.title {
            put("title", Value::String(title.clone()));
        }
        if let Some(slug) = &self.slug {
            put("slug", Value::String(slug.clone()));
        }
        if let Some(description) = &self.description {
            put("description", Value::String(description.clone()));
        }
        if let Some(excerpt) = &self.excerpt {
            put("excerpt", Value::String(excerpt.clone()));
        }
        if let Some(date) = &self.date {
            put("date", Value::String(date.clone()));
        }
        if let Some(cover) = &self.cover_image {
            put("coverImage", Value::String(cover.clone()));
        }
        if !self.tags.is_empty() {
            put(
                "tags",
                Value::Sequence(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(author) = &self.author {
            put("author", Value::String(author.clone()));
        }
        put("published", Value::Bool(self.published));
        for (key, value) in &self.extra {
            put(key, value.clone());
        }

        let yaml = serde_yaml::to_string(&mapping)?;
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{body}"))
    }
}

/// Parse a date string in various formats
fn parse_date_string(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    for fmt in formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return localize(naive, tz);
        }
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return localize(d.and_hms_opt(0, 0, 0)?, tz);
        }
    }

    None
}

fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_frontmatter() {
        let content = r#"---
title: Hello World
date: 2024-01-15 10:30:00
tags:
  - rust
  - web
coverImage: /images/hello.png
series: intro
---

This is the content.
"#;

        let (fm, body) = FrontMatter::parse(content).unwrap();
        assert_eq!(fm.title.as_deref(), Some("Hello World"));
        assert_eq!(fm.tags, vec!["rust", "web"]);
        assert_eq!(fm.cover_image.as_deref(), Some("/images/hello.png"));
        assert!(fm.published);
        assert_eq!(fm.extra.get("series"), Some(&Value::String("intro".into())));
        assert_eq!(body, "This is the content.\n");
    }

    #[test]
    fn test_no_frontmatter_is_all_body() {
        let content = "# Just a heading\n\nSome text.";
        let (fm, body) = FrontMatter::parse(content).unwrap();
        assert_eq!(fm, FrontMatter::default());
        assert_eq!(body, content);
    }

    #[test]
    fn test_unterminated_frontmatter_is_an_error() {
        let content = "---\ntitle: Broken\ndate: 2024-01-01\n\nBody text";
        assert_eq!(
            FrontMatter::parse(content).unwrap_err(),
            FrontMatterError::Unterminated
        );
    }

    #[test]
    fn test_invalid_yaml_keeps_body() {
        let content = "---\ntitle: [unclosed\nauthor: me\n---\nBody survives";
        let (fm, body) = FrontMatter::parse(content).unwrap();
        assert_eq!(fm.title, None);
        assert_eq!(body, "Body survives");
    }

    #[test]
    fn test_lenient_field_types() {
        let content = r#"---
title: 2024
tags: ai, rust , ,web
published: "no"
---
Body"#;
        let (fm, _) = FrontMatter::parse(content).unwrap();
        assert_eq!(fm.title.as_deref(), Some("2024"));
        assert_eq!(fm.tags, vec!["ai", "rust", "web"]);
        assert!(!fm.published);
    }

    #[test]
    fn test_summary_accepts_excerpt_key() {
        let (fm, _) = FrontMatter::parse("---\nexcerpt: Short one\n---\nBody").unwrap();
        assert_eq!(fm.summary(), Some("Short one"));
    }

    #[test]
    fn test_parse_date_in_timezone() {
        let fm = FrontMatter {
            date: Some("2024-01-15 10:30:00".to_string()),
            ..Default::default()
        };
        let dt = fm.parse_date(chrono_tz::Europe::Paris).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-15T09:30:00+00:00");

        let fm = FrontMatter {
            date: Some("2024-03-01".to_string()),
            ..Default::default()
        };
        let dt = fm.parse_date(chrono_tz::UTC).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-03-01 00:00");

        let fm = FrontMatter {
            date: Some("2024-03-01T12:00:00+02:00".to_string()),
            ..Default::default()
        };
        let dt = fm.parse_date(chrono_tz::UTC).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "10:00");
    }

    #[test]
    fn test_markdown_separator_not_yaml() {
        let content = r#"---

Some random text with markdown lists:
- Item 1
- Item 2

---
More content here.
"#;

        let (fm, body) = FrontMatter::parse(content).unwrap();
        assert_eq!(fm.title, None);
        assert!(body.contains("Some random text"));
        assert!(body.contains("More content here."));
    }

    #[test]
    fn test_document_round_trip() {
        let fm = FrontMatter {
            title: Some("Colons: and \"quotes\"".to_string()),
            slug: Some("colons-and-quotes".to_string()),
            date: Some("2024-05-01T08:00:00+00:00".to_string()),
            tags: vec!["a".to_string(), "b".to_string()],
            published: false,
            ..Default::default()
        };
        let body = "\nFirst line after a blank.\n\n```rust\nfn main() {}\n```\n";

        let document = fm.to_document(body).unwrap();
        let (parsed, parsed_body) = FrontMatter::parse(&document).unwrap();
        assert_eq!(parsed, fm);
        assert_eq!(parsed_body, body);
    }
}
