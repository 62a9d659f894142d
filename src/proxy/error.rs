//! Error types of the forwarding stage.

use thiserror::Error;

use crate::fallback::FallbackError;

/// Why a single upstream call did not produce a response.
///
/// Every variant counts as a breaker failure and leads to the fallback.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The request has no upstream host to go to.
    #[error("request has no route host")]
    NoRouteHost,

    /// The outbound request could not be assembled.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    /// Connect or read failure.
    #[error("upstream request to {route} failed: {source}")]
    Upstream {
        route: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// No response head within the socket timeout.
    #[error("upstream {route} did not respond within {timeout_ms} ms")]
    SocketTimeout { route: String, timeout_ms: u128 },

    /// The connection pool has been shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// The task running the call panicked or was cancelled.
    #[error("upstream call aborted: {0}")]
    Aborted(String),
}

/// The only error that escapes the stage: no response could be produced at all.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("fallback unavailable for command key '{key}'")]
    FallbackUnavailable {
        key: String,
        #[source]
        source: FallbackError,
    },
}
