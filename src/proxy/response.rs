//! Response produced by the forwarding stage, real or synthetic.

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;

/// Status, headers and a streamed body.
#[derive(Debug)]
pub struct ProxyResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    synthetic: bool,
}

impl ProxyResponse {
    /// A response received from the upstream.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
            synthetic: false,
        }
    }

    /// A response built from a fallback payload.
    pub fn synthetic(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
            synthetic: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Read the body to the end and throw it away, returning the byte count.
    ///
    /// Reading to EOF is what lets the client hand the connection back to
    /// its pool.
    pub async fn discard_body(self) -> Result<usize, axum::Error> {
        let mut stream = self.body.into_data_stream();
        let mut drained = 0;
        while let Some(chunk) = stream.next().await {
            drained += chunk?.len();
        }
        Ok(drained)
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
