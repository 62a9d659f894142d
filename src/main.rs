//! Circuit-breaking reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                    CIRCUIT PROXY                      │
//!                         │                                                       │
//!   Client Request        │  ┌─────────┐   ┌─────────┐   ┌─────────────────────┐  │
//!   ──────────────────────┼─▶│  http   │──▶│ routing │──▶│ proxy stage         │  │
//!                         │  │ server  │   │ + key   │   │  breaker executor   │  │
//!                         │  └─────────┘   └─────────┘   └──────────┬──────────┘  │
//!                         │                                ok │     │ open/fail/  │
//!                         │                                   ▼     ▼ timeout     │
//!                         │                          ┌──────────┐ ┌──────────┐    │
//!   Client Response       │                          │forwarder │ │ fallback │    │
//!   ◀─────────────────────┼──────────────────────────│ + pool   │ │ payloads │    │
//!                         │                          └────┬─────┘ └──────────┘    │
//!                         │                               │                       │
//!                         │  config watcher → source → pool rebuild (timeouts)    │
//!                         └───────────────────────────────┼───────────────────────┘
//!                                                         ▼
//!                                                      Upstream
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use circuit_proxy::config::loader::load_config;
use circuit_proxy::config::watcher::ConfigWatcher;
use circuit_proxy::config::ProxyConfig;
use circuit_proxy::observability::{logging, metrics};
use circuit_proxy::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "circuit-proxy")]
#[command(about = "Reverse proxy with per-command circuit breakers and synthetic fallbacks", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "circuit-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        fallback_payloads = config.fallback.payloads.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = std::sync::Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    let signals = shutdown.clone();
    tokio::spawn(async move { signals.trigger_on_signal().await });

    let server = HttpServer::new(config)?;
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
