//! The forwarding stage: key, breaker, upstream call, fallback.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use futures_util::future::BoxFuture;

use crate::pool::ConnectionPool;
use crate::proxy::error::{ForwardError, ProxyError};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::request::ProxyRequest;
use crate::proxy::response::ProxyResponse;
use crate::resilience::BreakerExecutor;
use crate::routing::KeyBuilder;

/// A step of the request pipeline.
pub trait Stage: Send + Sync {
    /// Whether this stage handles `request` at all.
    fn applies(&self, request: &ProxyRequest) -> bool;

    /// Produce the response. Never fails; errors are rendered as responses.
    fn apply(&self, request: ProxyRequest) -> BoxFuture<'_, ProxyResponse>;
}

/// Turns a routed request into a response, real or synthetic.
pub struct ProxyStage {
    keys: KeyBuilder,
    executor: Arc<BreakerExecutor>,
    forwarder: Arc<Forwarder>,
    pool: Arc<ConnectionPool>,
}

impl ProxyStage {
    pub fn new(
        keys: KeyBuilder,
        executor: Arc<BreakerExecutor>,
        forwarder: Arc<Forwarder>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            keys,
            executor,
            forwarder,
            pool,
        }
    }

    pub fn executor(&self) -> &BreakerExecutor {
        &self.executor
    }

    /// Run the request through the breaker of its command key.
    ///
    /// The pooled client is looked up when the call starts, so a call admitted
    /// after a rebuild uses the new client.
    pub async fn handle(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let key = self.keys.build(request.path(), request.headers());
        tracing::debug!(key = %key, method = %request.method(), path = %request.path(), "Command key derived");

        let pool = self.pool.clone();
        let forwarder = self.forwarder.clone();
        self.executor
            .execute(&key, move || async move {
                let client = pool.current_client().map_err(|_| ForwardError::PoolClosed)?;
                forwarder.forward(&client, request).await
            })
            .await
    }

    /// Like [`handle`](Self::handle), with a missing fallback turned into a
    /// generic 500.
    pub async fn respond(&self, request: ProxyRequest) -> ProxyResponse {
        match self.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "No response could be produced");
                internal_error()
            }
        }
    }
}

impl Stage for ProxyStage {
    /// Only requests already matched to an upstream host are handled.
    fn applies(&self, request: &ProxyRequest) -> bool {
        request.route_host().is_some()
    }

    fn apply(&self, request: ProxyRequest) -> BoxFuture<'_, ProxyResponse> {
        Box::pin(self.respond(request))
    }
}

fn internal_error() -> ProxyResponse {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    ProxyResponse::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        headers,
        Body::from("Internal Server Error"),
    )
}
