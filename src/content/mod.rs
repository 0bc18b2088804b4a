//! Content module - article parsing, derived fields and rendering

mod article;
pub mod frontmatter;
pub mod markdown;
pub mod reading_time;
pub mod slug;
pub mod tags;

pub use article::{normalize_tags, ArticleMeta, ArticleRecord, ParseContext};
pub use frontmatter::{FrontMatter, FrontMatterError};
pub use markdown::{
    Document, FallbackDocument, Heading, MarkdownRenderer, RenderError, Rendered, SourceFormat,
};
