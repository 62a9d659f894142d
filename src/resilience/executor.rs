//! Breaker-guarded execution of upstream calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BreakerConfig;
use crate::fallback::SyntheticResponseProvider;
use crate::observability::metrics;
use crate::proxy::{ForwardError, ProxyError, ProxyResponse};
use crate::resilience::circuit_breaker::{BreakerRegistry, BreakerSettings};
use crate::resilience::timeouts::{run_with_deadline, CallOutcome};
use crate::routing::CommandKey;

/// Runs calls under the breaker of their command key and substitutes the
/// synthetic response whenever a call is rejected, fails or times out.
pub struct BreakerExecutor {
    registry: BreakerRegistry,
    provider: Arc<SyntheticResponseProvider>,
    execution_timeout: Duration,
    drain_timeout: Duration,
}

impl BreakerExecutor {
    pub fn new(config: &BreakerConfig, provider: Arc<SyntheticResponseProvider>) -> Self {
        Self {
            registry: BreakerRegistry::new(BreakerSettings::from(config)),
            provider,
            execution_timeout: Duration::from_millis(config.execution_timeout_ms),
            drain_timeout: Duration::from_millis(config.drain_timeout_ms),
        }
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }

    /// Execute `call` for `key`.
    ///
    /// `call` is only invoked when the breaker admits the request. Upstream
    /// errors never escape; the only error is a missing fallback.
    pub async fn execute<C, Fut>(&self, key: &CommandKey, call: C) -> Result<ProxyResponse, ProxyError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProxyResponse, ForwardError>> + Send + 'static,
    {
        let breaker = self.registry.get(key);
        let Some(permit) = breaker.try_acquire() else {
            tracing::debug!(key = %key, state = breaker.state().as_str(), "Short-circuited");
            return self.fallback(key, "short_circuited").await;
        };

        match run_with_deadline(call(), self.execution_timeout, self.drain_timeout).await {
            CallOutcome::Completed(Ok(response)) => {
                permit.succeed();
                Ok(response)
            }
            CallOutcome::Completed(Err(error)) => {
                tracing::warn!(key = %key, error = %error, probe = permit.is_probe(), "Upstream call failed");
                permit.fail();
                self.fallback(key, "failure").await
            }
            CallOutcome::TimedOut => {
                tracing::warn!(
                    key = %key,
                    timeout_ms = self.execution_timeout.as_millis() as u64,
                    probe = permit.is_probe(),
                    "Upstream call timed out"
                );
                permit.fail();
                self.fallback(key, "timeout").await
            }
        }
    }

    async fn fallback(&self, key: &CommandKey, reason: &'static str) -> Result<ProxyResponse, ProxyError> {
        metrics::record_fallback(reason);
        match self.provider.get(key).await {
            Ok(payload) => Ok(payload.to_response()),
            Err(source) => Err(ProxyError::FallbackUnavailable {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::{header, HeaderMap, StatusCode};
    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use tokio::sync::Barrier;

    use crate::fallback::{PayloadStore, MOCK_PAYLOAD_HEADER};
    use crate::resilience::BreakerState;

    struct StaticStore;

    impl PayloadStore for StaticStore {
        fn load<'a>(&'a self, location: &'a str) -> BoxFuture<'a, io::Result<Bytes>> {
            let found = match location {
                "orders.json" => Some(Bytes::from_static(br#"{"status":"unavailable"}"#)),
                "fault.xml" => Some(Bytes::from_static(b"<fault/>")),
                _ => None,
            };
            Box::pin(async move { found.ok_or_else(|| io::Error::from(io::ErrorKind::NotFound)) })
        }
    }

    fn config(volume: u32, sleep_window_ms: u64, execution_timeout_ms: u64) -> BreakerConfig {
        BreakerConfig {
            request_volume_threshold: volume,
            sleep_window_ms,
            execution_timeout_ms,
            ..BreakerConfig::default()
        }
    }

    fn executor(config: &BreakerConfig) -> BreakerExecutor {
        let mut locations = HashMap::new();
        locations.insert("orders".to_string(), "orders.json".to_string());
        locations.insert("billing-pay-".to_string(), "fault.xml".to_string());
        let provider = SyntheticResponseProvider::new(Arc::new(locations), Arc::new(StaticStore));
        BreakerExecutor::new(config, Arc::new(provider))
    }

    fn ok_response() -> Result<ProxyResponse, ForwardError> {
        Ok(ProxyResponse::new(StatusCode::OK, HeaderMap::new(), Body::from("real")))
    }

    #[tokio::test]
    async fn success_passes_through() {
        let executor = executor(&config(20, 5_000, 1_000));
        let key = CommandKey::from("orders-create-");
        let response = executor.execute(&key, || async { ok_response() }).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.is_synthetic());
        assert!(response.headers().get(MOCK_PAYLOAD_HEADER).is_none());
    }

    #[tokio::test]
    async fn failure_serves_synthetic_response() {
        let executor = executor(&config(20, 5_000, 1_000));
        let key = CommandKey::from("orders-create-CreateOrder");
        let response = executor
            .execute(&key, || async { Err(ForwardError::NoRouteHost) })
            .await
            .unwrap();

        assert!(response.is_synthetic());
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[MOCK_PAYLOAD_HEADER], "true");
    }

    #[tokio::test]
    async fn xml_fallback_is_a_server_error() {
        let executor = executor(&config(20, 5_000, 1_000));
        let key = CommandKey::from("billing-pay-");
        let response = executor
            .execute(&key, || async { Err(ForwardError::PoolClosed) })
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/xml");
    }

    #[tokio::test]
    async fn open_breaker_never_invokes_call() {
        let executor = executor(&config(2, 60_000, 1_000));
        let key = CommandKey::from("orders-list-");
        for _ in 0..2 {
            executor
                .execute(&key, || async { Err(ForwardError::PoolClosed) })
                .await
                .unwrap();
        }
        assert_eq!(executor.registry().state("orders-list-"), Some(BreakerState::Open));

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let calls = calls.clone();
            let response = executor
                .execute(&key, move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { ok_response() }
                })
                .await
                .unwrap();
            assert!(response.is_synthetic());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_one_probe_after_sleep_window() {
        let executor = Arc::new(executor(&config(2, 50, 2_000)));
        let key = CommandKey::from("orders-sync-");
        for _ in 0..2 {
            executor
                .execute(&key, || async { Err(ForwardError::PoolClosed) })
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let callers = 16;
        let barrier = Arc::new(Barrier::new(callers));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();
        for _ in 0..callers {
            let executor = executor.clone();
            let barrier = barrier.clone();
            let calls = calls.clone();
            let key = key.clone();
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                executor
                    .execute(&key, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                            ok_response()
                        }
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut real = 0;
        for task in tasks {
            if !task.await.unwrap().is_synthetic() {
                real += 1;
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(real, 1);
        assert_eq!(executor.registry().state("orders-sync-"), Some(BreakerState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out_to_fallback() {
        let executor = executor(&config(20, 5_000, 100));
        let key = CommandKey::from("orders-slow-");
        let response = executor
            .execute(&key, || std::future::pending::<Result<ProxyResponse, ForwardError>>())
            .await
            .unwrap();
        assert!(response.is_synthetic());
        assert_eq!(response.headers()[MOCK_PAYLOAD_HEADER], "true");

        let breaker = executor.registry().get(&key);
        assert_eq!(breaker.counts().failures, 1);
    }

    #[tokio::test]
    async fn missing_fallback_is_an_error() {
        let executor = executor(&config(20, 5_000, 1_000));
        let key = CommandKey::from("inventory-count-");
        let err = executor
            .execute(&key, || async { Err(ForwardError::PoolClosed) })
            .await
            .unwrap_err();
        match err {
            ProxyError::FallbackUnavailable { key, .. } => assert_eq!(key, "inventory-count-"),
        }
    }
}
