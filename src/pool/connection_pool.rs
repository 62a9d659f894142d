//! Connection pool lifecycle: construction, periodic eviction, hot swap, shutdown.
//!
//! The eviction sweep does not close sockets. Idle pooled sockets are closed
//! by hyper once `pool_idle_timeout` passes; the sweep only forgets limiter
//! routes that saw no traffic since the previous run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{PoolConfig, PoolTimeouts};
use crate::observability::metrics;
use crate::pool::client::PooledClient;
use crate::pool::limits::ConnectionLimiter;
use crate::pool::PoolError;

/// Owns the current [`PooledClient`] and the eviction task.
pub struct ConnectionPool {
    config: PoolConfig,
    limiter: Arc<ConnectionLimiter>,
    current: ArcSwapOption<PooledClient>,
    /// Serializes rebuilds and shutdown.
    rebuild: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    eviction_runs: Arc<AtomicU64>,
    cancel: CancellationToken,
    eviction_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
    /// Build the first client and start the eviction task.
    ///
    /// Connection limits are taken from `config` once and never change.
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &PoolConfig) -> Result<Self, PoolError> {
        let limiter = Arc::new(ConnectionLimiter::new(
            config.max_total_connections,
            config.max_per_route_connections,
        ));
        let client = PooledClient::build(1, config.timeouts(), config, limiter.clone())?;

        let cancel = CancellationToken::new();
        let eviction_runs = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run_eviction(
            limiter.clone(),
            eviction_runs.clone(),
            Duration::from_millis(config.eviction_initial_delay_ms),
            Duration::from_millis(config.eviction_interval_ms),
            cancel.clone(),
        ));

        tracing::info!(
            max_total_connections = config.max_total_connections,
            max_per_route_connections = config.max_per_route_connections,
            socket_timeout_ms = config.socket_timeout_ms,
            connect_timeout_ms = config.connect_timeout_ms,
            "Connection pool created"
        );

        Ok(Self {
            config: config.clone(),
            limiter,
            current: ArcSwapOption::from_pointee(client),
            rebuild: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(1),
            eviction_runs,
            cancel,
            eviction_task: Mutex::new(Some(task)),
        })
    }

    /// The live client. Fails only after shutdown.
    pub fn current_client(&self) -> Result<Arc<PooledClient>, PoolError> {
        self.current.load_full().ok_or(PoolError::Closed)
    }

    /// Swap in a client built with `timeouts`.
    ///
    /// Returns `false` when the current client already uses them. Callers
    /// holding the previous client keep using it until they drop it.
    pub async fn reconfigure(&self, timeouts: PoolTimeouts) -> Result<bool, PoolError> {
        let _guard = self.rebuild.lock().await;
        if self.cancel.is_cancelled() {
            return Err(PoolError::Closed);
        }

        let current = self.current_client()?;
        if current.timeouts() == timeouts {
            return Ok(false);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let next = PooledClient::build(generation, timeouts, &self.config, self.limiter.clone())?;
        let previous = self.current.swap(Some(Arc::new(next)));
        metrics::record_pool_rebuild();

        tracing::info!(
            generation,
            previous_generation = current.generation(),
            socket_timeout_ms = timeouts.socket.as_millis() as u64,
            connect_timeout_ms = timeouts.connect.as_millis() as u64,
            "Pooled client rebuilt"
        );

        // Sockets of the old generation close once the last in-flight call drops it.
        drop(previous);
        Ok(true)
    }

    /// Rebuild the client whenever the timeouts published on `updates` change.
    pub fn spawn_reconfigure_listener(
        self: &Arc<Self>,
        mut updates: watch::Receiver<PoolTimeouts>,
    ) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = pool.cancel.cancelled() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let timeouts = *updates.borrow_and_update();
                        if let Err(e) = pool.reconfigure(timeouts).await {
                            tracing::error!(error = %e, "Failed to rebuild pooled client, keeping current one");
                        }
                    }
                }
            }
            tracing::debug!("Pool reconfigure listener stopped");
        })
    }

    /// Completed eviction sweeps.
    pub fn eviction_runs(&self) -> u64 {
        self.eviction_runs.load(Ordering::Acquire)
    }

    pub fn limiter(&self) -> &ConnectionLimiter {
        &self.limiter
    }

    /// Stop the eviction task and release the current client.
    pub async fn shutdown(&self) {
        let _guard = self.rebuild.lock().await;
        self.cancel.cancel();

        let task = self
            .eviction_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Eviction task ended abnormally");
            }
        }

        self.limiter.close();
        if let Some(client) = self.current.swap(None) {
            tracing::info!(generation = client.generation(), "Connection pool shut down");
        }
    }
}

async fn run_eviction(
    limiter: Arc<ConnectionLimiter>,
    runs: Arc<AtomicU64>,
    initial_delay: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = time::sleep(initial_delay) => {}
    }

    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let released = limiter.evict_idle();
                runs.fetch_add(1, Ordering::AcqRel);
                if released > 0 {
                    metrics::record_evicted_routes(released);
                    tracing::debug!(released, "Released idle route slots");
                }
            }
        }
    }
    tracing::debug!("Eviction task stopped");
}
