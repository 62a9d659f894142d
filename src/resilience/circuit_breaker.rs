//! Circuit breaker per command key.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: upstream assumed down, requests fail fast
//! - Half-Open: one probe request is testing the upstream
//!
//! # State Transitions
//! ```text
//! Closed → Open: window volume >= request_volume_threshold
//!                and failure ratio > error_threshold_percentage
//! Open → Half-Open: first caller after sleep_window wins a CAS on the state
//! Half-Open → Closed: probe succeeds (window reset)
//! Half-Open → Open: probe fails, times out, or is abandoned (sleep window restarts)
//! ```

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::window::{HealthCounts, RollingWindow};
use crate::routing::CommandKey;

/// Breaker state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for BreakerState {
    fn from(val: u8) -> Self {
        match val {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

impl BreakerState {
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Thresholds shared by every breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub error_threshold_percentage: u8,
    pub request_volume_threshold: u32,
    pub sleep_window: Duration,
    pub rolling_window: Duration,
    pub rolling_window_buckets: u32,
}

impl From<&BreakerConfig> for BreakerSettings {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            error_threshold_percentage: config.error_threshold_percentage,
            request_volume_threshold: config.request_volume_threshold,
            sleep_window: Duration::from_millis(config.sleep_window_ms),
            rolling_window: Duration::from_millis(config.rolling_window_ms),
            rolling_window_buckets: config.rolling_window_buckets,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

/// Breaker for a single command key.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: CommandKey,
    settings: BreakerSettings,
    state: AtomicU8,
    origin: Instant,
    /// Milliseconds since `origin` of the last transition to Open.
    opened_at_ms: AtomicU64,
    window: RollingWindow,
}

impl CircuitBreaker {
    pub fn new(key: CommandKey, settings: BreakerSettings) -> Self {
        let window = RollingWindow::new(settings.rolling_window, settings.rolling_window_buckets);
        Self {
            key,
            settings,
            state: AtomicU8::new(BreakerState::Closed as u8),
            origin: Instant::now(),
            opened_at_ms: AtomicU64::new(0),
            window,
        }
    }

    pub fn key(&self) -> &CommandKey {
        &self.key
    }

    pub fn state(&self) -> BreakerState {
        BreakerState::from(self.state.load(Ordering::Acquire))
    }

    /// Outcomes currently in the rolling window.
    pub fn counts(&self) -> HealthCounts {
        self.window.counts()
    }

    /// Ask to run a call. `None` means the call must not be attempted.
    pub fn try_acquire(self: &Arc<Self>) -> Option<BreakerPermit> {
        match self.state() {
            BreakerState::Closed => Some(BreakerPermit::new(self.clone(), false)),
            BreakerState::HalfOpen => None,
            BreakerState::Open => {
                if !self.sleep_window_elapsed() {
                    return None;
                }
                self.state
                    .compare_exchange(
                        BreakerState::Open as u8,
                        BreakerState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .ok()?;
                // A probe that failed between our check and the CAS re-armed the window.
                if !self.sleep_window_elapsed() {
                    self.state.store(BreakerState::Open as u8, Ordering::Release);
                    return None;
                }
                tracing::info!(key = %self.key, "Circuit half-open, admitting probe");
                metrics::record_breaker_transition(BreakerState::HalfOpen.as_str());
                Some(BreakerPermit::new(self.clone(), true))
            }
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_window_elapsed(&self) -> bool {
        let opened_at = self.opened_at_ms.load(Ordering::Acquire);
        self.now_ms().saturating_sub(opened_at) >= self.settings.sleep_window.as_millis() as u64
    }

    fn trip(&self, from: BreakerState) -> bool {
        self.opened_at_ms.store(self.now_ms(), Ordering::Release);
        let tripped = self
            .state
            .compare_exchange(from as u8, BreakerState::Open as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if tripped {
            metrics::record_breaker_transition(BreakerState::Open.as_str());
        }
        tripped
    }

    fn on_success(&self, probe: bool) {
        if probe {
            self.window.reset();
            self.state.store(BreakerState::Closed as u8, Ordering::Release);
            tracing::info!(key = %self.key, "Probe succeeded, circuit closed");
            metrics::record_breaker_transition(BreakerState::Closed.as_str());
        } else {
            self.window.record(false);
        }
    }

    fn on_failure(&self, probe: bool) {
        if probe {
            self.trip(BreakerState::HalfOpen);
            tracing::warn!(key = %self.key, sleep_window_ms = self.settings.sleep_window.as_millis() as u64, "Probe failed, circuit re-opened");
            return;
        }

        let counts = self.window.record(true);
        if self.state() == BreakerState::Closed
            && counts.total >= u64::from(self.settings.request_volume_threshold)
            && counts.exceeds(self.settings.error_threshold_percentage)
            && self.trip(BreakerState::Closed)
        {
            tracing::warn!(
                key = %self.key,
                total = counts.total,
                failures = counts.failures,
                error_percentage = counts.error_percentage(),
                "Circuit opened"
            );
        }
    }
}

/// Right to run one call. Report the outcome with [`succeed`](Self::succeed)
/// or [`fail`](Self::fail); a probe permit dropped unreported re-opens the
/// circuit.
#[derive(Debug)]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl BreakerPermit {
    fn new(breaker: Arc<CircuitBreaker>, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            tracing::debug!(key = %self.breaker.key, "Probe abandoned");
            self.breaker.on_failure(true);
        }
    }
}

/// Lazily created breakers, one per command key, kept for the process lifetime.
#[derive(Debug)]
pub struct BreakerRegistry {
    settings: BreakerSettings,
    breakers: DashMap<CommandKey, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// The breaker for `key`, creating it on first use.
    pub fn get(&self, key: &CommandKey) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return existing.clone();
        }
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(key = %key, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(key.clone(), self.settings.clone()))
            })
            .clone()
    }

    /// State of an existing breaker.
    pub fn state(&self, key: &str) -> Option<BreakerState> {
        self.breakers.get(key).map(|b| b.state())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
