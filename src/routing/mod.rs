//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, headers)
//!     → router.rs (route lookup → upstream host)
//!     → matcher.rs (evaluate match conditions)
//!     → key.rs (derive the command key for breaker + fallback)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always yields the same route and key
//! - First match wins (ordered by priority)

pub mod key;
pub mod matcher;
pub mod router;

pub use key::{CommandKey, KeyBuilder};
pub use router::{Route, Router};
