//! Pooled outbound HTTP client.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use hyper::body::{Body as _, Frame, Incoming, SizeHint};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use native_tls::TlsConnector;

use crate::config::{PoolConfig, PoolTimeouts};
use crate::pool::limits::{ConnectionLimiter, ConnectionPermit};
use crate::pool::PoolError;
use crate::proxy::ForwardError;

/// One generation of the outbound client.
///
/// Sockets belong to the generation that opened them and are closed when the
/// last reference to it goes away. Connection limits are shared across
/// generations.
pub struct PooledClient {
    generation: u64,
    timeouts: PoolTimeouts,
    client: Client<HttpsConnector<HttpConnector>, Body>,
    limiter: Arc<ConnectionLimiter>,
}

impl PooledClient {
    pub fn build(
        generation: u64,
        timeouts: PoolTimeouts,
        config: &PoolConfig,
        limiter: Arc<ConnectionLimiter>,
    ) -> Result<Self, PoolError> {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(timeouts.connect));

        let tls = if config.danger_accept_invalid_certs {
            tracing::warn!("Upstream certificate verification is disabled");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?
        } else {
            TlsConnector::new()?
        };
        let https = HttpsConnector::from((http, tls.into()));

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .pool_max_idle_per_host(config.max_per_route_connections)
            .retry_canceled_requests(false)
            .set_host(true)
            .build(https);

        Ok(Self {
            generation,
            timeouts,
            client,
            limiter,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn timeouts(&self) -> PoolTimeouts {
        self.timeouts
    }

    /// Send `request` to `route` (`scheme://host:port`).
    ///
    /// Resolves once the response head has arrived. The connection slot stays
    /// taken until the returned body is consumed or dropped.
    pub async fn send(&self, route: &str, request: Request<Body>) -> Result<Response<Body>, ForwardError> {
        let permit = self
            .limiter
            .acquire(route)
            .await
            .map_err(|_| ForwardError::PoolClosed)?;

        let response = match tokio::time::timeout(self.timeouts.socket, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(ForwardError::Upstream {
                    route: route.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ForwardError::SocketTimeout {
                    route: route.to_string(),
                    timeout_ms: self.timeouts.socket.as_millis(),
                })
            }
        };

        let (parts, incoming) = response.into_parts();
        let body = Body::new(PermitBody {
            inner: incoming,
            _permit: permit,
        });
        Ok(Response::from_parts(parts, body))
    }
}

/// Response body that holds its connection slot until dropped.
struct PermitBody {
    inner: Incoming,
    _permit: ConnectionPermit,
}

impl hyper::body::Body for PermitBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
