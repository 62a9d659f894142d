//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → source.rs (ArcSwap of the live config)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → source.rs swaps it in
//!     → timeout changes published on a watch channel
//!     → connection pool rebuilds its client
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Pool limits and routes are read at startup; timeouts and fallback
//!   payload locations are live

pub mod loader;
pub mod schema;
pub mod source;
pub mod validation;
pub mod watcher;

pub use schema::{
    BreakerConfig, FallbackConfig, ForwardingConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, PoolConfig, PoolTimeouts, ProxyConfig, RouteConfig,
};
pub use source::ConfigSource;
