//! Truncation Utilities
//!
//! Character-count truncation that always cuts on a UTF-8 boundary.
//! All limits in the memory engine are expressed in characters, not bytes.

/// Byte offset of the `max_chars`-th character, or `text.len()` when shorter.
fn char_boundary(text: &str, max_chars: usize) -> usize {
    text.char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Borrow at most `max_chars` leading characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    &text[..char_boundary(text, max_chars)]
}

/// Owned variant of [`truncate_chars`], used where the result is stored.
pub fn truncate_owned(text: &str, max_chars: usize) -> String {
    truncate_chars(text, max_chars).to_string()
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
