//! Route matching logic.
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Path matching is case-sensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::{HeaderMap, Uri};

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request target and headers match this condition.
    fn matches(&self, uri: &Uri, headers: &HeaderMap) -> bool;
}

/// Matches the Host header, ignoring any port.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, uri: &Uri, headers: &HeaderMap) -> bool {
        let host = headers
            .get("host")
            .and_then(|h| h.to_str().ok())
            .or_else(|| uri.host());
        host.map(|h| {
            let bare = h.rsplit_once(':').map_or(h, |(name, _)| name);
            bare.eq_ignore_ascii_case(&self.expected_host) || h.eq_ignore_ascii_case(&self.expected_host)
        })
        .unwrap_or(false)
    }
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, uri: &Uri, _headers: &HeaderMap) -> bool {
        uri.path().starts_with(&self.prefix)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, uri: &Uri, headers: &HeaderMap) -> bool {
        self.matchers.iter().all(|m| m.matches(uri, headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn host(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_host_matcher() {
        let matcher = HostMatcher::new("example.com");
        let uri: Uri = "/".parse().unwrap();

        assert!(matcher.matches(&uri, &host("example.com")));
        assert!(matcher.matches(&uri, &host("EXAMPLE.COM:8080")));
        assert!(!matcher.matches(&uri, &host("other.com")));
        assert!(!matcher.matches(&uri, &HeaderMap::new()));
    }

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api");

        let api: Uri = "http://example.com/api/v1".parse().unwrap();
        assert!(matcher.matches(&api, &HeaderMap::new()));

        let images: Uri = "http://example.com/images".parse().unwrap();
        assert!(!matcher.matches(&images, &HeaderMap::new()));
    }
}
