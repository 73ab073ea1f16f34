//! HTTP cache control module
//!
//! `ETag` generation, conditional request checks and `Cache-Control` values
//! for static files.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One year, for immutable uploads and found assets
pub const LONG_MAX_AGE: u32 = 31_536_000;
/// One hour, for the fallback image
pub const FALLBACK_MAX_AGE: u32 = 3600;

/// Generate a quoted `ETag` from file content
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let v = hasher.finish();
    format!("\"{v:x}\"")
}

/// Check a client's `If-None-Match` against the server `ETag`.
///
/// Handles a list of tags and the `*` wildcard. True means 304.
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag
            .split(',')
            .any(|e| e.trim() == etag || e.trim() == "*")
    })
}

/// Cache-Control policy for a static response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Public cache with max-age in seconds
    Public(u32),
}

impl CachePolicy {
    pub fn to_header_value(self) -> String {
        match self {
            Self::Public(max_age) => format!("public, max-age={max_age}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_quoted_and_stable() {
        let etag = generate_etag(b"cover image");
        assert!(etag.starts_with('"') && etag.ends_with('"'));
        assert_eq!(etag, generate_etag(b"cover image"));
        assert_ne!(etag, generate_etag(b"other image"));
    }

    #[test]
    fn test_check_etag_match() {
        let etag = "\"abc123\"";
        assert!(check_etag_match(Some("\"abc123\""), etag));
        assert!(check_etag_match(Some("\"xyz\", \"abc123\""), etag));
        assert!(check_etag_match(Some("*"), etag));
        assert!(!check_etag_match(Some("\"different\""), etag));
        assert!(!check_etag_match(None, etag));
    }

    #[test]
    fn test_cache_policy() {
        assert_eq!(
            CachePolicy::Public(LONG_MAX_AGE).to_header_value(),
            "public, max-age=31536000"
        );
        assert_eq!(
            CachePolicy::Public(FALLBACK_MAX_AGE).to_header_value(),
            "public, max-age=3600"
        );
    }
}
