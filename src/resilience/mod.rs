//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! executor.rs (per command key)
//!     → circuit_breaker.rs (admit, short-circuit, or admit one probe)
//!     → timeouts.rs (race the call against its deadline, reap late responses)
//!     → circuit_breaker.rs (record success/failure in window.rs)
//!     → on rejection, failure or timeout: fallback subsystem
//! ```
//!
//! # Design Decisions
//! - No retries; a failed call goes straight to the fallback
//! - Breakers live as long as the process, one per command key
//! - Upstream 5xx responses are responses, not failures

pub mod circuit_breaker;
pub mod executor;
pub mod timeouts;
pub mod window;

pub use circuit_breaker::{BreakerPermit, BreakerRegistry, BreakerSettings, BreakerState, CircuitBreaker};
pub use executor::BreakerExecutor;
pub use timeouts::{run_with_deadline, CallOutcome};
pub use window::{HealthCounts, RollingWindow};
