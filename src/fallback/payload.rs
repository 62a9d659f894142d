//! Synthetic payload value type.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;

use crate::proxy::ProxyResponse;

/// Marker header present on every synthetic response.
pub const MOCK_PAYLOAD_HEADER: HeaderName = HeaderName::from_static("mock-payload");

/// Payload flavour, decided by the location's file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// `.xml` payloads (SOAP faults).
    Xml,
    /// Everything else.
    Json,
}

impl PayloadKind {
    pub fn from_location(location: &str) -> Self {
        if location.ends_with(".xml") {
            PayloadKind::Xml
        } else {
            PayloadKind::Json
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            PayloadKind::Xml => StatusCode::INTERNAL_SERVER_ERROR,
            PayloadKind::Json => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            PayloadKind::Xml => "text/xml",
            PayloadKind::Json => "application/json",
        }
    }
}

/// A loaded fallback payload.
#[derive(Debug, Clone)]
pub struct SyntheticPayload {
    kind: PayloadKind,
    body: Bytes,
    location: String,
}

impl SyntheticPayload {
    pub fn new(location: impl Into<String>, body: Bytes) -> Self {
        let location = location.into();
        Self {
            kind: PayloadKind::from_location(&location),
            body,
            location,
        }
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn content_type(&self) -> &'static str {
        self.kind.content_type()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Where the payload was loaded from.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Build a fresh response; the body bytes are shared, not copied.
    pub fn to_response(&self) -> ProxyResponse {
        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(MOCK_PAYLOAD_HEADER, HeaderValue::from_static("true"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type()));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        ProxyResponse::synthetic(self.status(), headers, Body::from(self.body.clone()))
    }
}
