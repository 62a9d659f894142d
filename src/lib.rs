//! Circuit-breaking reverse proxy library.
//!
//! Each routed request is keyed, run under the circuit breaker of its key
//! with a bounded deadline, and answered with a configured synthetic payload
//! when the upstream fails, times out or is short-circuited.

pub mod config;
pub mod fallback;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pool;
pub mod proxy;
pub mod resilience;
pub mod routing;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyRequest, ProxyResponse, ProxyStage};
