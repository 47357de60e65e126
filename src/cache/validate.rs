//! Input validation for URLs and exclusion patterns.

use url::Url;

const UNSAFE_PATTERN_FRAGMENTS: [&str; 4] = ["../", "./", "\\", "\0"];

/// An absolute `http`/`https` URL with a non-empty host.
pub fn validate_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    matches!(parsed.scheme(), "http" | "https")
        && parsed.host_str().is_some_and(|host| !host.is_empty())
}

/// Exclusion patterns must not carry path traversal or NUL fragments.
pub fn is_safe_url_pattern(pattern: &str) -> bool {
    !UNSAFE_PATTERN_FRAGMENTS
        .iter()
        .any(|fragment| pattern.contains(fragment))
}
