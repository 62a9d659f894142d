//! Inbound request as seen by the forwarding stage.

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, Method};
use url::Url;

/// A request already matched to an upstream host.
///
/// Immutable once built. The body can only be taken by consuming the request.
#[derive(Debug)]
pub struct ProxyRequest {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Body,
    route_host: Option<Url>,
}

impl ProxyRequest {
    /// Build from a method, a `path[?query]` target, headers and body.
    pub fn new(
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: Body,
        route_host: Option<Url>,
    ) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };
        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            headers,
            body,
            route_host,
        }
    }

    /// Build from the parts of an inbound `http::Request`.
    pub fn from_parts(parts: Parts, body: Body, route_host: Option<Url>) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            route_host,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Upstream this request was routed to, if any.
    pub fn route_host(&self) -> Option<&Url> {
        self.route_host.as_ref()
    }

    /// Declared body length; `None` means chunked or absent.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Whether the request method conventionally carries a body upstream.
    pub fn carries_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    pub fn into_body(self) -> Body {
        self.body
    }
}
