//! Parsing of free-form model answers.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:regex)?[ \t]*\r?\n?(.+?)\s*```").expect("valid fence regex")
});

/// Pull the pattern out of the first fenced code block of a response.
///
/// Surrounding `/.../` delimiters are stripped. Returns `None` when the
/// response carries no fenced block or the block is empty.
pub fn extract_fenced_pattern(response: &str) -> Option<String> {
    let caps = FENCED_BLOCK.captures(response)?;
    let mut pattern = caps.get(1)?.as_str().trim();

    if pattern.len() >= 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        pattern = &pattern[1..pattern.len() - 1];
    }

    if pattern.is_empty() {
        None
    } else {
        Some(pattern.to_string())
    }
}
