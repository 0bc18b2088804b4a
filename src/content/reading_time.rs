//! Reading time estimate

/// Average adult reading speed in words per minute
pub const WORDS_PER_MINUTE: usize = 200;

/// Estimate reading time at the default speed.
pub fn estimate(body: &str) -> String {
    estimate_with_speed(body, WORDS_PER_MINUTE)
}

/// Estimate reading time as `"<n> min read"`, rounded up, at least one minute.
pub fn estimate_with_speed(body: &str, words_per_minute: usize) -> String {
    let words = body.split_whitespace().count();
    let minutes = words.div_ceil(words_per_minute.max(1)).max(1);
    format!("{} min read", minutes)
}
