//! Header translation between the inbound and outbound sides.

use axum::http::header::{self, HeaderMap, HeaderName};

/// Headers that only describe a single connection.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Decides which headers are copied across.
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    ignored: Vec<HeaderName>,
}

impl HeaderFilter {
    /// Hop-by-hop headers plus `extra` names, which are matched case-insensitively.
    /// Names that are not valid header names are skipped.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ignored = HOP_BY_HOP.to_vec();
        for name in extra {
            match HeaderName::from_bytes(name.as_ref().trim().to_ascii_lowercase().as_bytes()) {
                Ok(name) if !ignored.contains(&name) => ignored.push(name),
                Ok(_) => {}
                Err(_) => tracing::warn!(header = name.as_ref(), "Ignoring invalid header name"),
            }
        }
        Self { ignored }
    }

    /// Headers for the outbound request.
    ///
    /// `host` is set by the client from the upstream URI and `content-length`
    /// is re-derived from the body, so both are dropped here.
    pub fn request_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        let mut out = self.copy(inbound);
        out.remove(header::HOST);
        out.remove(header::CONTENT_LENGTH);
        out
    }

    /// Headers for the response sent back to the client.
    pub fn response_headers(&self, upstream: &HeaderMap) -> HeaderMap {
        self.copy(upstream)
    }

    fn copy(&self, from: &HeaderMap) -> HeaderMap {
        let listed = connection_listed(from);
        let mut out = HeaderMap::with_capacity(from.len());
        for (name, value) in from {
            if self.ignored.contains(name) || listed.contains(name) {
                continue;
            }
            out.append(name.clone(), value.clone());
        }
        out
    }
}

impl Default for HeaderFilter {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

/// Names listed in `Connection` are hop-by-hop for that message.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().to_ascii_lowercase().as_bytes()).ok())
        .collect()
}
