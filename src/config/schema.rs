//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to upstream hosts.
    pub routes: Vec<RouteConfig>,

    /// Outbound connection pool settings.
    pub pool: PoolConfig,

    /// Circuit breaker settings, shared by every command key.
    pub breaker: BreakerConfig,

    /// Synthetic response locations per command key.
    pub fallback: FallbackConfig,

    /// Request/response translation settings.
    pub proxy: ForwardingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping requests to an upstream host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Upstream base URL, e.g. "http://orders.internal:8080/api".
    pub upstream: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Outbound connection pool configuration.
///
/// The connection limits are read once at startup. The two timeouts are
/// hot-reloadable and trigger a rebuild of the pooled client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum concurrent upstream connections across all routes.
    pub max_total_connections: usize,

    /// Maximum concurrent upstream connections per scheme/host/port.
    pub max_per_route_connections: usize,

    /// Time allowed for the upstream to produce a response head, in milliseconds.
    pub socket_timeout_ms: u64,

    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Idle pooled sockets older than this are closed, in seconds.
    pub idle_timeout_secs: u64,

    /// Delay before the first eviction sweep, in milliseconds.
    pub eviction_initial_delay_ms: u64,

    /// Period between eviction sweeps, in milliseconds.
    pub eviction_interval_ms: u64,

    /// Skip upstream certificate and hostname verification.
    ///
    /// Never enable this outside of local testing.
    pub danger_accept_invalid_certs: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total_connections: 200,
            max_per_route_connections: 20,
            socket_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
            idle_timeout_secs: 90,
            eviction_initial_delay_ms: 15_000,
            eviction_interval_ms: 5_000,
            danger_accept_invalid_certs: false,
        }
    }
}

impl PoolConfig {
    /// The reloadable part of the pool configuration.
    pub fn timeouts(&self) -> PoolTimeouts {
        PoolTimeouts {
            socket: Duration::from_millis(self.socket_timeout_ms),
            connect: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

/// Socket and connect timeouts of a pooled client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolTimeouts {
    pub socket: Duration,
    pub connect: Duration,
}

impl Default for PoolTimeouts {
    fn default() -> Self {
        PoolConfig::default().timeouts()
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure percentage (0-100) that must be exceeded to open the circuit.
    pub error_threshold_percentage: u8,

    /// Minimum number of calls in the rolling window before the
    /// failure percentage is evaluated.
    pub request_volume_threshold: u32,

    /// Time the circuit stays open before a probe is let through, in milliseconds.
    pub sleep_window_ms: u64,

    /// Length of the rolling statistics window, in milliseconds.
    pub rolling_window_ms: u64,

    /// Number of buckets the rolling window is divided into.
    pub rolling_window_buckets: u32,

    /// Deadline for a single upstream call, in milliseconds.
    pub execution_timeout_ms: u64,

    /// How long an abandoned call may take to finish and drain, in milliseconds.
    pub drain_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50,
            request_volume_threshold: 20,
            sleep_window_ms: 5_000,
            rolling_window_ms: 10_000,
            rolling_window_buckets: 10,
            execution_timeout_ms: 1_000,
            drain_timeout_ms: 10_000,
        }
    }
}

/// Synthetic response configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FallbackConfig {
    /// Command key (or broader key) -> payload location.
    pub payloads: HashMap<String, String>,

    /// Directory that relative payload locations are resolved against.
    pub base_dir: Option<String>,
}

/// Request/response translation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Header whose value(s) become the command key suffix verbatim.
    pub key_override_header: String,

    /// Header whose last path token becomes the command key suffix.
    pub key_hint_header: String,

    /// Extra headers dropped in both directions, on top of hop-by-hop ones.
    pub ignored_headers: Vec<String>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            key_override_header: "HYSTRIX_PREFIX".to_string(),
            key_hint_header: "SOAPAction".to_string(),
            ignored_headers: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
