//! Fallback subsystem.
//!
//! # Data Flow
//! ```text
//! Breaker rejects / call fails / call times out
//!     → provider.rs (key → cached payload)
//!         → store.rs PayloadLocator (key, then broader key, → location)
//!         → store.rs PayloadStore (location → bytes, first use only)
//!     → payload.rs (bytes → status, content type, Mock-Payload header)
//! ```
//!
//! # Design Decisions
//! - Outcomes are cached per key, failures included
//! - `.xml` payloads are served as 500 `text/xml`, everything else as 503 `application/json`

pub mod payload;
pub mod provider;
pub mod store;

pub use payload::{PayloadKind, SyntheticPayload, MOCK_PAYLOAD_HEADER};
pub use provider::{broader_key, FallbackError, SyntheticResponseProvider};
pub use store::{FsPayloadStore, PayloadLocator, PayloadStore};
