//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Logs are shipped alongside incident data, so these functions keep
//! credentials, host paths and full model output out of them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks the value of credential-bearing query parameters in a URL.
///
/// - `https://host/v1/models/x:generateContent?key=AIza...` → `...?key=****`
/// - `https://host/deploy?api-version=2024-02-01` → unchanged
pub fn redact_url_query(url: &str) -> String {
    const SENSITIVE: &[&str] = &["key", "api_key", "api-key", "token"];

    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let redacted: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if SENSITIVE.contains(&name.to_ascii_lowercase().as_str()) => {
                format!("{}=****", name)
            }
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", base, redacted.join("&"))
}

/// Shortens `text` to at most `max_chars` characters on a char boundary,
/// appending `...` when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Truncates `text` to at most `max_chars` characters without splitting a
/// UTF-8 sequence. Returns the kept slice and whether truncation happened.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Returns a short deterministic hash for correlation without exposing
/// the hashed value.
pub fn fingerprint<T: Hash + ?Sized>(value: &T) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
