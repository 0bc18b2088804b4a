//! Markdown rendering with syntax highlighting and heading anchors
//!
//! [`MarkdownRenderer::compile`] is the only entry point the rest of the crate
//! uses for article bodies. It never fails: a body that cannot be compiled
//! yields a [`Rendered::Fallback`] and the fault is logged.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use lazy_static::lazy_static;
use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;
use serde::Serialize;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;
use thiserror::Error;

use crate::helpers::{html_escape, squash_whitespace};

/// Notice shown in place of an article body that failed to compile
pub const FALLBACK_NOTICE: &str = "This article could not be displayed.";

/// Marker separating a hand-written excerpt from the rest of the body
const MORE_MARKERS: [&str; 2] = ["<!-- more -->", "{/* more */}"];

lazy_static! {
    static ref COMPONENT_TAG: Regex =
        Regex::new(r"<(/)?([A-Z][A-Za-z0-9_.]*)").expect("valid component tag regex");
}

/// Why a body could not be compiled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Malformed markup: {0}")]
    Malformed(String),

    #[error("Renderer panicked: {0}")]
    Panicked(String),
}

/// Markup dialect of an article source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Markdown,
    Mdx,
}

impl SourceFormat {
    /// Extensions in lookup priority order
    pub const EXTENSIONS: [&'static str; 2] = ["mdx", "md"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "mdx" => Some(Self::Mdx),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Mdx => "mdx",
        }
    }
}

/// A heading anchor collected while rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub level: u8,
    pub id: String,
    pub text: String,
}

/// A fully rendered article body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub html: String,
    pub headings: Vec<Heading>,
}

/// What is shown instead of a body that failed to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackDocument {
    pub notice: String,
    pub description: String,
}

impl FallbackDocument {
    pub fn new(description: &str) -> Self {
        Self {
            notice: FALLBACK_NOTICE.to_string(),
            description: description.to_string(),
        }
    }

    /// Minimal HTML for the fallback
    pub fn to_html(&self) -> String {
        format!(
            r#"<div class="render-fallback"><p class="notice">{}</p><p>{}</p></div>"#,
            html_escape(&self.notice),
            html_escape(&self.description)
        )
    }
}

/// Outcome of compiling an article body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rendered {
    Document(Document),
    Fallback(FallbackDocument),
}

impl Rendered {
    pub fn html(&self) -> String {
        match self {
            Rendered::Document(doc) => doc.html.clone(),
            Rendered::Fallback(fallback) => fallback.to_html(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Rendered::Fallback(_))
    }
}

/// Markdown renderer with syntax highlighting
pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme_name: String,
    line_numbers: bool,
}

impl MarkdownRenderer {
    /// Create a new markdown renderer
    pub fn new() -> Self {
        Self::with_options("base16-ocean.dark", true)
    }

    /// Create with custom settings
    pub fn with_options(theme: &str, line_numbers: bool) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme_name: theme.to_string(),
            line_numbers,
        }
    }

    /// Compile an article body, substituting a fallback on any failure
    pub fn compile(&self, body: &str, format: SourceFormat, description: &str) -> Rendered {
        match self.try_compile(body, format) {
            Ok(doc) => Rendered::Document(doc),
            Err(e) => {
                tracing::error!("Failed to render article body, using fallback: {}", e);
                Rendered::Fallback(FallbackDocument::new(description))
            }
        }
    }

    fn try_compile(&self, body: &str, format: SourceFormat) -> Result<Document, RenderError> {
        match format {
            SourceFormat::Mdx => check_mdx_syntax(body)?,
            SourceFormat::Markdown => check_markup(body)?,
        }
        guarded(|| self.render_document(body))
    }

    /// Render markdown to HTML
    pub fn render(&self, markdown: &str) -> String {
        self.render_document(markdown).html
    }

    fn render_document(&self, markdown: &str) -> Document {
        // YAML metadata blocks stay off; front matter is split beforehand
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_SMART_PUNCTUATION
            | Options::ENABLE_HEADING_ATTRIBUTES
            | Options::ENABLE_GFM;
        let parser = Parser::new_ext(markdown, options);

        let mut events: Vec<Event> = Vec::new();
        let mut headings = Vec::new();
        let mut anchors = AnchorSet::default();

        let mut code_block: Option<Option<String>> = None;
        let mut code_content = String::new();

        let mut heading: Option<Tag> = None;
        let mut heading_events: Vec<Event> = Vec::new();
        let mut heading_text = String::new();

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) => lang
                            .split_whitespace()
                            .next()
                            .filter(|l| !l.is_empty())
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code_block = Some(lang);
                    code_content.clear();
                }
                Event::End(TagEnd::CodeBlock) => {
                    let lang = code_block.take().flatten();
                    let highlighted = self.highlight_code(&code_content, lang.as_deref());
                    events.push(Event::Html(CowStr::from(highlighted)));
                }
                Event::Text(text) if code_block.is_some() => {
                    code_content.push_str(&text);
                }
                Event::Start(tag @ Tag::Heading { .. }) => {
                    heading = Some(tag);
                    heading_events.clear();
                    heading_text.clear();
                }
                Event::End(TagEnd::Heading(level)) => {
                    let Some(Tag::Heading {
                        id, classes, attrs, ..
                    }) = heading.take()
                    else {
                        continue;
                    };
                    let text = squash_whitespace(&heading_text);
                    let anchor = anchors.claim(id.as_deref().unwrap_or(&slug::slugify(&text)));

                    events.push(Event::Start(Tag::Heading {
                        level,
                        id: Some(CowStr::from(anchor.clone())),
                        classes,
                        attrs,
                    }));
                    events.push(Event::Html(CowStr::from(format!(
                        r##"<a class="heading-anchor" href="#{}" aria-hidden="true">#</a>"##,
                        anchor
                    ))));
                    events.append(&mut heading_events);
                    events.push(Event::End(TagEnd::Heading(level)));

                    headings.push(Heading {
                        level: level as u8,
                        id: anchor,
                        text,
                    });
                }
                event if heading.is_some() => {
                    if let Event::Text(text) | Event::Code(text) = &event {
                        heading_text.push_str(text);
                    }
                    heading_events.push(event);
                }
                event => events.push(event),
            }
        }

        let mut html_output = String::new();
        html::push_html(&mut html_output, events.into_iter());

        Document {
            html: html_output,
            headings,
        }
    }

    /// Highlight a code block
    fn highlight_code(&self, code: &str, lang: Option<&str>) -> String {
        let lang = lang.unwrap_or("text");

        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let theme = self
            .theme_set
            .themes
            .get(&self.theme_name)
            .or_else(|| self.theme_set.themes.values().next());

        let highlighted = theme.and_then(|theme| {
            highlighted_html_for_string(code, &self.syntax_set, syntax, theme).ok()
        });

        match highlighted {
            Some(highlighted) if self.line_numbers => self.add_line_numbers(&highlighted, lang),
            Some(highlighted) => format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                lang, highlighted
            ),
            None => format!(
                r#"<pre><code class="language-{}">{}</code></pre>"#,
                lang,
                html_escape(code)
            ),
        }
    }

    /// Add line numbers to highlighted code
    fn add_line_numbers(&self, code: &str, lang: &str) -> String {
        let lines: Vec<&str> = code.lines().collect();

        let gutter = (1..=lines.len())
            .map(|n| format!(r#"<span class="line-number">{}</span>"#, n))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"<figure class="highlight {}"><table><tr><td class="gutter"><pre>{}</pre></td><td class="code"><pre>{}</pre></td></tr></table></figure>"#,
            lang,
            gutter,
            lines.join("\n")
        )
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Heading ids already handed out in one document
#[derive(Default)]
struct AnchorSet {
    seen: HashMap<String, usize>,
}

impl AnchorSet {
    fn claim(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "section" } else { base };
        let count = self.seen.entry(base.to_string()).or_insert(0);
        let id = if *count == 0 {
            base.to_string()
        } else {
            format!("{}-{}", base, count)
        };
        *count += 1;
        id
    }
}

/// Run a renderer call, turning a panic into an error
fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, RenderError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        RenderError::Panicked(message)
    })
}

/// Reject bodies with an unterminated code fence or an unclosed, mismatched
/// or unterminated component tag. Braces are literal text in Markdown.
pub fn check_markup(body: &str) -> Result<(), RenderError> {
    let prose = strip_code(body)?;
    check_component_tags(&prose)
}

/// [`check_markup`] plus balanced `{}` expressions, as an MDX compiler requires
pub fn check_mdx_syntax(body: &str) -> Result<(), RenderError> {
    let prose = strip_code(body)?;

    let mut depth: usize = 0;
    let mut escaped = false;
    for c in prose.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    RenderError::Malformed("unexpected `}` outside an expression".to_string())
                })?;
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err(RenderError::Malformed(
            "unterminated `{` expression".to_string(),
        ));
    }

    check_component_tags(&prose)
}

fn check_component_tags(prose: &str) -> Result<(), RenderError> {
    let mut stack: Vec<&str> = Vec::new();
    let mut from = 0;

    while let Some(caps) = COMPONENT_TAG.captures(&prose[from..]) {
        let Some(whole) = caps.get(0) else { break };
        let start = from + whole.start();
        let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let closing = caps.get(1).is_some();

        let (end, self_closing) = tag_end(prose, from + whole.end()).ok_or_else(|| {
            RenderError::Malformed(format!("unterminated <{}> tag at byte {}", name, start))
        })?;
        from = end;

        if closing {
            match stack.pop() {
                Some(open) if open == name => {}
                Some(open) => {
                    return Err(RenderError::Malformed(format!(
                        "expected </{}> but found </{}>",
                        open, name
                    )))
                }
                None => {
                    return Err(RenderError::Malformed(format!(
                        "closing tag </{}> without an opening tag",
                        name
                    )))
                }
            }
        } else if !self_closing {
            stack.push(name);
        }
    }

    if let Some(open) = stack.pop() {
        return Err(RenderError::Malformed(format!("unclosed <{}>", open)));
    }

    Ok(())
}

/// Find the `>` closing a tag whose attributes start at `from`.
///
/// `>` inside `{}` expressions or quoted strings does not count. Returns the
/// byte after the `>` and whether the tag is self-closing.
fn tag_end(prose: &str, from: usize) -> Option<(usize, bool)> {
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut last = None;

    for (offset, c) in prose[from..].char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '<' if depth == 0 => return None,
            '>' if depth == 0 => return Some((from + offset + 1, last == Some('/'))),
            _ => {}
        }
        if !c.is_whitespace() {
            last = Some(c);
        }
    }

    None
}

/// Blank out fenced code blocks and inline code spans, keeping line structure
fn strip_code(body: &str) -> Result<String, RenderError> {
    let mut prose = String::with_capacity(body.len());
    let mut fence: Option<(char, usize, usize)> = None;

    for (index, line) in body.lines().enumerate() {
        let trimmed = line.trim_start();
        let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~');
        let run = marker
            .map(|m| trimmed.chars().take_while(|c| *c == m).count())
            .unwrap_or(0);

        match (fence, marker) {
            (Some((open_char, open_len, _)), Some(m))
                if m == open_char && run >= open_len && trimmed[run..].trim().is_empty() =>
            {
                fence = None;
            }
            (Some(_), _) => {}
            (None, Some(m)) if run >= 3 => {
                fence = Some((m, run, index + 1));
            }
            (None, _) => prose.push_str(&strip_inline_code(line)),
        }
        prose.push('\n');
    }

    match fence {
        Some((_, _, line)) => Err(RenderError::Malformed(format!(
            "code fence opened on line {} is never closed",
            line
        ))),
        None => Ok(prose),
    }
}

fn strip_inline_code(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(start) = rest.find('`') {
        out.push_str(&rest[..start]);
        let ticks = rest[start..].chars().take_while(|c| *c == '`').count();
        let delimiter = "`".repeat(ticks);
        let after = &rest[start + ticks..];
        match after.find(&delimiter) {
            Some(end) => rest = &after[end + ticks..],
            None => {
                out.push_str(&rest[start..start + ticks]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Hand-written excerpt before a `more` marker, if the body has one
pub fn split_excerpt(content: &str) -> Option<&str> {
    MORE_MARKERS
        .iter()
        .find_map(|marker| content.find(marker))
        .map(|pos| content[..pos].trim())
        .filter(|excerpt| !excerpt.is_empty())
}

/// Readable prose of a markdown body, markup and code blocks removed
pub fn plain_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());
    let mut in_code_block = false;
    for event in Parser::new_ext(markdown, Options::ENABLE_GFM) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
            Event::End(TagEnd::CodeBlock) => in_code_block = false,
            Event::Text(_) if in_code_block => {}
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item) => text.push(' '),
            _ => {}
        }
    }
    squash_whitespace(&text)
}
