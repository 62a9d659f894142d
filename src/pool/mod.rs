//! Outbound connection pool.
//!
//! # Data Flow
//! ```text
//! ConfigSource timeout change
//!     → connection_pool.rs (build new client.rs generation, swap, drop old)
//! Forwarder
//!     → connection_pool.rs current_client()
//!     → client.rs send (limits.rs slot held until body dropped)
//! Eviction task (initial delay, then fixed period)
//!     → limits.rs evict_idle
//! ```

pub mod client;
pub mod connection_pool;
pub mod limits;

pub use client::PooledClient;
pub use connection_pool::ConnectionPool;
pub use limits::{ConnectionLimiter, ConnectionPermit};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("connection pool is closed")]
    Closed,
}
