//! Single upstream call: build the outbound request, send it, wrap the response.
//!
//! No retries happen here. Deadlines and failure accounting belong to the
//! breaker executor.

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Uri};
use url::Url;

use crate::pool::PooledClient;
use crate::proxy::error::ForwardError;
use crate::proxy::headers::HeaderFilter;
use crate::proxy::request::ProxyRequest;
use crate::proxy::response::ProxyResponse;

/// Where an outbound request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTarget {
    /// `scheme://host:port`, the unit connection limits apply to.
    pub route: String,
    pub uri: Uri,
}

impl OutboundTarget {
    /// Combine the upstream base URL with a request path and query.
    pub fn resolve(host: &Url, path: &str, query: Option<&str>) -> Result<Self, ForwardError> {
        let scheme = host.scheme();
        let name = host
            .host_str()
            .ok_or_else(|| ForwardError::InvalidRequest(format!("upstream '{host}' has no host")))?;
        let port = host
            .port_or_known_default()
            .ok_or_else(|| ForwardError::InvalidRequest(format!("upstream '{host}' has no port")))?;

        let route = format!("{scheme}://{name}:{port}");
        let mut target = format!("{route}{}", normalize_path(host.path(), path));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }

        let uri = target
            .parse::<Uri>()
            .map_err(|e| ForwardError::InvalidRequest(format!("{target}: {e}")))?;
        Ok(Self { route, uri })
    }
}

/// Join `base` and `path`, collapse repeated separators and resolve `.` and
/// `..` segments. Keeps a trailing separator.
pub fn normalize_path(base: &str, path: &str) -> String {
    let joined = format!("{base}/{path}");
    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(joined.len());
    out.push('/');
    out.push_str(&segments.join("/"));
    if !segments.is_empty() && path.ends_with('/') {
        out.push('/');
    }
    out
}

/// Forwards requests through a pooled client.
#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    headers: HeaderFilter,
}

impl Forwarder {
    pub fn new(headers: HeaderFilter) -> Self {
        Self { headers }
    }

    /// Send `request` to its route host with `client`.
    ///
    /// Bodies are streamed both ways. POST, PUT and PATCH send the inbound
    /// body, with its declared length when there is one and chunked otherwise;
    /// other methods send none.
    pub async fn forward(&self, client: &PooledClient, request: ProxyRequest) -> Result<ProxyResponse, ForwardError> {
        let host = request.route_host().ok_or(ForwardError::NoRouteHost)?;
        let target = OutboundTarget::resolve(host, request.path(), request.query())?;

        let mut headers = self.headers.request_headers(request.headers());
        let method = request.method().clone();
        let body = if request.carries_body() {
            if let Some(length) = request.content_length() {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            }
            request.into_body()
        } else {
            Body::empty()
        };

        tracing::debug!(method = %method, uri = %target.uri, "Forwarding request");

        let mut outbound = Request::builder()
            .method(method)
            .uri(target.uri)
            .body(body)
            .map_err(|e| ForwardError::InvalidRequest(e.to_string()))?;
        *outbound.headers_mut() = headers;

        let response = client.send(&target.route, outbound).await?;
        let (parts, body) = response.into_parts();
        Ok(ProxyResponse::new(
            parts.status,
            self.headers.response_headers(&parts.headers),
            body,
        ))
    }
}
