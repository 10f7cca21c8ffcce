//! Utility functions and helpers

use std::path::PathBuf;

/// Return the prefix of `s` holding at most `max_chars` characters.
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Cut `s` to `max_chars` characters and append `...` when anything was dropped.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let head = take_chars(s, max_chars);
    if head.len() == s.len() {
        s.to_string()
    } else {
        format!("{}...", head)
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
