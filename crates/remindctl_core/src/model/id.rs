//! Identifier normalization shared by all three sources.

use once_cell::sync::Lazy;
use regex::Regex;

// `x-apple-reminder://ABC`, `x-apple-reminderkit://REMCDReminder/ABC`, ...
static URL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://(?:.*/)?").expect("url prefix pattern is a valid regex")
});

/// Normalizes an identifier for cross-source comparison.
///
/// Trims whitespace, strips any `scheme://.../` prefix down to the last
/// path segment and uppercases ASCII letters.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = URL_PREFIX.replace(trimmed, "");
    stripped.trim_matches('/').to_ascii_uppercase()
}

/// Compares two identifiers after normalization.
pub fn same_identifier(left: &str, right: &str) -> bool {
    normalize_identifier(left) == normalize_identifier(right)
}
