//! Text normalization for incoming reports.

use crate::config::SUMMARY_MAX_CHARS;

/// Collapse every whitespace run to a single space and trim both ends.
///
/// Idempotent: `normalize_text(&normalize_text(x)) == normalize_text(x)`.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `SUMMARY_MAX_CHARS` characters of `text`.
/// Counts chars, not bytes, so multi-byte input never splits a code point.
pub fn truncate_summary(text: &str) -> String {
    match text.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
