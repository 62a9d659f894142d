//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Routed request (request.rs)
//!     → stage.rs (command key from the routing subsystem)
//!     → resilience executor (breaker, deadline, fallback)
//!         → forwarder.rs (outbound URI, headers.rs, pooled client)
//!     → response.rs (streamed upstream body or synthetic payload)
//! ```
//!
//! # Design Decisions
//! - Bodies are streamed in both directions, never buffered
//! - Upstream transport errors never leave the stage
//! - Redirects are passed through to the client, not followed

pub mod error;
pub mod forwarder;
pub mod headers;
pub mod request;
pub mod response;
pub mod stage;

pub use error::{ForwardError, ProxyError};
pub use forwarder::{normalize_path, Forwarder, OutboundTarget};
pub use headers::HeaderFilter;
pub use request::ProxyRequest;
pub use response::ProxyResponse;
pub use stage::{ProxyStage, Stage};
