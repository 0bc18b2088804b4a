//! Slug derivation and validation
//!
//! A slug is the only external identifier of an article. The grammar is
//! `[a-z0-9]+(-[a-z0-9]+)*`: lowercase ASCII letters and digits, single
//! hyphens between runs, nothing at either edge.

/// Derive a slug from a title.
///
/// Lowercases and trims, turns whitespace runs into single hyphens, drops
/// everything outside `[a-z0-9-]`, then collapses repeated hyphens and strips
/// them from both ends. The result may be empty when the title has no ASCII
/// letters or digits.
pub fn generate(title: &str) -> String {
    let lowered = title.trim().to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;

    for c in lowered.chars() {
        if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        }
    }

    slug
}

/// Check that `candidate` is something [`generate`] could have produced.
pub fn validate(candidate: &str) -> bool {
    !candidate.is_empty()
        && !candidate.starts_with('-')
        && !candidate.ends_with('-')
        && !candidate.contains("--")
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Pick the slug for an article: the explicit one when it is valid,
/// otherwise one derived from the title.
pub fn resolve(explicit: Option<&str>, title: &str) -> String {
    match explicit.map(str::trim) {
        Some(candidate) if validate(candidate) => candidate.to_string(),
        Some(candidate) => {
            tracing::debug!("Ignoring invalid slug {:?}, deriving from title", candidate);
            generate(title)
        }
        None => generate(title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_basic() {
        assert_eq!(generate("Hello World"), "hello-world");
        assert_eq!(generate("  Rust & WebAssembly: A Primer  "), "rust-webassembly-a-primer");
        assert_eq!(generate("Tabs\tand\nnewlines"), "tabs-and-newlines");
    }

    #[test]
    fn test_generate_collapses_hyphens() {
        assert_eq!(generate("a -- b"), "a-b");
        assert_eq!(generate("--edge--"), "edge");
        assert_eq!(generate("What's new in 2024?"), "whats-new-in-2024");
    }

    #[test]
    fn test_generate_strips_non_ascii() {
        assert_eq!(generate("Café au lait"), "caf-au-lait");
        assert_eq!(generate("日本語"), "");
    }

    #[test]
    fn test_generate_output_always_validates() {
        let titles = [
            "Hello World",
            "  leading and trailing  ",
            "Symbols !@#$%^&*() everywhere",
            "multiple   spaces",
            "UPPER lower 123",
            "-already-slugged-",
            "a - - b",
            "x",
        ];
        for title in titles {
            let slug = generate(title);
            assert!(validate(&slug), "{:?} -> {:?}", title, slug);
            assert_eq!(generate(title), slug);
        }
    }

    #[test]
    fn test_validate() {
        assert!(validate("hello-world"));
        assert!(validate("2024-recap"));
        assert!(!validate(""));
        assert!(!validate("-hello"));
        assert!(!validate("hello-"));
        assert!(!validate("hello--world"));
        assert!(!validate("Hello-World"));
        assert!(!validate("hello_world"));
    }

    #[test]
    fn test_resolve_prefers_valid_explicit_slug() {
        assert_eq!(resolve(Some("custom-slug"), "Some Title"), "custom-slug");
        assert_eq!(resolve(Some("Not Valid"), "Some Title"), "some-title");
        assert_eq!(resolve(None, "Some Title"), "some-title");
    }
}
