//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, synthetic
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_fallbacks_total` (counter): fallbacks by reason
//! - `proxy_breaker_transitions_total` (counter): breaker state changes by target state
//! - `proxy_payload_loads_total` (counter): fallback payload loads by outcome
//! - `proxy_pool_rebuilds_total` (counter): pooled client hot swaps
//! - `proxy_pool_evicted_routes_total` (counter): idle route slots released

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, synthetic: bool, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "synthetic" => synthetic.to_string()
    )
    .increment(1);
    metrics::histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_fallback(reason: &'static str) {
    metrics::counter!("proxy_fallbacks_total", "reason" => reason).increment(1);
}

pub fn record_breaker_transition(to: &'static str) {
    metrics::counter!("proxy_breaker_transitions_total", "to" => to).increment(1);
}

pub fn record_payload_loaded(ok: bool) {
    let outcome = if ok { "loaded" } else { "failed" };
    metrics::counter!("proxy_payload_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_pool_rebuild() {
    metrics::counter!("proxy_pool_rebuilds_total").increment(1);
}

pub fn record_evicted_routes(count: usize) {
    metrics::counter!("proxy_pool_evicted_routes_total").increment(count as u64);
}
