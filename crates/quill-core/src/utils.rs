//! Utility helpers — data paths and Unicode-safe string clipping.

use std::path::PathBuf;

/// Get the Quill data directory (e.g. `~/.quill/`).
pub fn get_data_path() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".quill")
}

/// Get the default workspace path (e.g. `~/.quill/workspace/`).
pub fn get_default_workspace_path() -> PathBuf {
    get_data_path().join("workspace")
}

/// Current ISO 8601 timestamp.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Number of Unicode scalar values in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// The first `max_chars` characters of `s`, borrowed.
pub fn head_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if char_len(s) <= max_len {
        s.to_string()
    } else {
        format!("{}...", head_chars(s, max_len.saturating_sub(3)))
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| std::env::var("USERPROFILE").ok().map(PathBuf::from))
}
