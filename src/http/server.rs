//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (tracing, request ID)
//! - Build the forwarding stage and its collaborators
//! - Follow configuration updates while serving
//! - Shut the connection pool down after the last connection drains

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigSource, ForwardingConfig, ProxyConfig};
use crate::fallback::{FsPayloadStore, PayloadLocator, SyntheticResponseProvider};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::observability::metrics;
use crate::pool::{ConnectionPool, PoolError};
use crate::proxy::{Forwarder, HeaderFilter, ProxyRequest, ProxyStage, Stage};
use crate::resilience::BreakerExecutor;
use crate::routing::{KeyBuilder, Router as ProxyRouter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    pub stage: Arc<ProxyStage>,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    source: Arc<ConfigSource>,
    pool: Arc<ConnectionPool>,
    stage: Arc<ProxyStage>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Must be called inside a Tokio runtime; the connection pool starts its
    /// eviction task here.
    pub fn new(config: ProxyConfig) -> Result<Self, PoolError> {
        let source = Arc::new(ConfigSource::new(config.clone()));
        let locator: Arc<dyn PayloadLocator> = source.clone();
        let store = Arc::new(FsPayloadStore::new(config.fallback.base_dir.as_ref().map(PathBuf::from)));
        let provider = Arc::new(SyntheticResponseProvider::new(locator, store));

        let executor = Arc::new(BreakerExecutor::new(&config.breaker, provider));
        let pool = Arc::new(ConnectionPool::new(&config.pool)?);
        let forwarder = Arc::new(Forwarder::new(HeaderFilter::new(&config.proxy.ignored_headers)));
        let stage = Arc::new(ProxyStage::new(
            key_builder(&config.proxy),
            executor,
            forwarder,
            pool.clone(),
        ));

        let state = AppState {
            router: Arc::new(ProxyRouter::from_config(config.routes.clone())),
            stage: stage.clone(),
        };
        tracing::info!(routes = state.router.len(), "Route table compiled");

        Ok(Self {
            router: Self::build_router(state),
            config,
            source,
            pool,
            stage,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http())
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Run the server until `shutdown` fires, applying `config_updates` meanwhile.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let follower = tokio::spawn(self.source.clone().follow(config_updates, shutdown.resubscribe()));
        let reconfigure = self.pool.spawn_reconfigure_listener(self.source.subscribe_timeouts());

        let served = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;

        self.pool.shutdown().await;
        let _ = reconfigure.await;
        let _ = follower.await;

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the startup config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Live configuration.
    pub fn source(&self) -> Arc<ConfigSource> {
        self.source.clone()
    }

    pub fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.clone()
    }

    pub fn stage(&self) -> Arc<ProxyStage> {
        self.stage.clone()
    }
}

fn key_builder(config: &ForwardingConfig) -> KeyBuilder {
    let parse = |name: &str| HeaderName::try_from(name.trim()).ok();
    match (parse(&config.key_override_header), parse(&config.key_hint_header)) {
        (Some(override_header), Some(hint_header)) => KeyBuilder::new(override_header, hint_header),
        _ => {
            tracing::warn!(
                override_header = %config.key_override_header,
                hint_header = %config.key_hint_header,
                "Invalid command key header names, using defaults"
            );
            KeyBuilder::default()
        }
    }
}

/// Main proxy handler.
/// Looks up the route host and hands the request to the forwarding stage.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request.headers().request_id().to_string();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();
    let route = state.router.match_request(&parts.uri, &parts.headers);
    let route_name = route.map(|r| r.name.clone());
    let proxy_request = ProxyRequest::from_parts(parts, body, route.map(|r| r.upstream.clone()));

    if !state.stage.applies(&proxy_request) {
        tracing::warn!(request_id = %request_id, path = %proxy_request.path(), "No route matched");
        metrics::record_request(&method, 404, false, start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    }

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %proxy_request.path(),
        route = route_name.as_deref().unwrap_or_default(),
        "Proxying request"
    );

    let response = state.stage.apply(proxy_request).await;
    metrics::record_request(&method, response.status().as_u16(), response.is_synthetic(), start_time);
    if response.is_synthetic() {
        tracing::info!(
            request_id = %request_id,
            status = response.status().as_u16(),
            "Served synthetic response"
        );
    }
    response.into_response()
}
