//! Text preparation for synthesis: markup stripping and message shaping.
//!
//! Pure functions, no I/O.

use regex::Regex;
use std::sync::LazyLock;

// Compiled regexes: allocated once, reused across calls.
static RE_MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Remove rich-text tags (`<color=red>`, `</b>`, …) so only spoken text
/// remains. Text outside tags is left untouched.
pub fn strip_markup(text: &str) -> String {
    RE_MARKUP_TAG.replace_all(text, "").into_owned()
}

/// Collapse every whitespace run, line breaks included, into one space and
/// trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    RE_MULTI_SPACE.replace_all(text, " ").trim().to_string()
}

/// Join a topic and body the way a reader would say them: `"topic body"`,
/// or just the body when the topic is empty.
pub fn compose_message(topic: &str, body: &str) -> String {
    let topic = topic.trim();
    if topic.is_empty() {
        body.to_string()
    } else {
        format!("{topic} {body}")
    }
}

/// Whether anything in `text` would actually be pronounced.
pub fn is_speakable(text: &str) -> bool {
    text.chars().any(|c| c.is_alphanumeric())
}
