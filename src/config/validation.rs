//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics and reports every
//! problem it finds rather than stopping at the first one.

use axum::http::HeaderName;
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route '{route}': upstream '{upstream}' is not a valid http(s) URL")]
    InvalidUpstream { route: String, upstream: String },

    #[error("route '{0}' is defined more than once")]
    DuplicateRoute(String),

    #[error("pool.{0} must be greater than zero")]
    ZeroPoolValue(&'static str),

    #[error("pool.max_per_route_connections ({per_route}) exceeds pool.max_total_connections ({total})")]
    PerRouteExceedsTotal { per_route: usize, total: usize },

    #[error("breaker.error_threshold_percentage must be within 0..=100, got {0}")]
    ThresholdOutOfRange(u8),

    #[error("breaker.{0} must be greater than zero")]
    ZeroBreakerValue(&'static str),

    #[error("breaker.rolling_window_ms ({window_ms}) is not divisible into {buckets} buckets")]
    UnevenBuckets { window_ms: u64, buckets: u32 },

    #[error("'{0}' is not a valid header name")]
    InvalidHeaderName(String),

    #[error("fallback location for '{0}' is empty")]
    EmptyPayloadLocation(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = std::collections::HashSet::new();
    for route in &config.routes {
        if !seen.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        let valid = Url::parse(&route.upstream)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::InvalidUpstream {
                route: route.name.clone(),
                upstream: route.upstream.clone(),
            });
        }
    }

    let pool = &config.pool;
    for (name, value) in [
        ("max_total_connections", pool.max_total_connections as u64),
        ("max_per_route_connections", pool.max_per_route_connections as u64),
        ("socket_timeout_ms", pool.socket_timeout_ms),
        ("connect_timeout_ms", pool.connect_timeout_ms),
        ("eviction_interval_ms", pool.eviction_interval_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroPoolValue(name));
        }
    }
    if pool.max_per_route_connections > pool.max_total_connections {
        errors.push(ValidationError::PerRouteExceedsTotal {
            per_route: pool.max_per_route_connections,
            total: pool.max_total_connections,
        });
    }

    let breaker = &config.breaker;
    if breaker.error_threshold_percentage > 100 {
        errors.push(ValidationError::ThresholdOutOfRange(breaker.error_threshold_percentage));
    }
    for (name, value) in [
        ("sleep_window_ms", breaker.sleep_window_ms),
        ("rolling_window_ms", breaker.rolling_window_ms),
        ("rolling_window_buckets", u64::from(breaker.rolling_window_buckets)),
        ("execution_timeout_ms", breaker.execution_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroBreakerValue(name));
        }
    }
    if breaker.rolling_window_buckets > 0
        && breaker.rolling_window_ms % u64::from(breaker.rolling_window_buckets) != 0
    {
        errors.push(ValidationError::UnevenBuckets {
            window_ms: breaker.rolling_window_ms,
            buckets: breaker.rolling_window_buckets,
        });
    }

    let forwarding = &config.proxy;
    for name in [&forwarding.key_override_header, &forwarding.key_hint_header]
        .into_iter()
        .chain(forwarding.ignored_headers.iter())
    {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    for (key, location) in &config.fallback.payloads {
        if location.trim().is_empty() {
            errors.push(ValidationError::EmptyPayloadLocation(key.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
