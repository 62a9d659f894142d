//! Live configuration shared with the running subsystems.
//!
//! The config watcher produces whole `ProxyConfig` values. `ConfigSource`
//! holds the current one behind an `ArcSwap` and republishes the two
//! reloadable pool timeouts on a `watch` channel, so the connection pool only
//! wakes up when they actually change.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{broadcast, mpsc, watch};

use crate::config::schema::{PoolTimeouts, ProxyConfig};
use crate::fallback::PayloadLocator;

/// Key-value view over the current configuration with change notification.
pub struct ConfigSource {
    current: ArcSwap<ProxyConfig>,
    timeouts: watch::Sender<PoolTimeouts>,
}

impl ConfigSource {
    pub fn new(config: ProxyConfig) -> Self {
        let (timeouts, _) = watch::channel(config.pool.timeouts());
        Self {
            current: ArcSwap::from_pointee(config),
            timeouts,
        }
    }

    /// Snapshot of the current configuration.
    pub fn current(&self) -> Arc<ProxyConfig> {
        self.current.load_full()
    }

    /// Subscribe to socket/connect timeout changes.
    pub fn subscribe_timeouts(&self) -> watch::Receiver<PoolTimeouts> {
        self.timeouts.subscribe()
    }

    /// Replace the current configuration and notify timeout subscribers
    /// if the timeouts changed.
    pub fn apply(&self, config: ProxyConfig) {
        let next = Arc::new(config);
        let previous = self.current.swap(Arc::clone(&next));

        if previous.pool.max_total_connections != next.pool.max_total_connections
            || previous.pool.max_per_route_connections != next.pool.max_per_route_connections
        {
            tracing::warn!(
                max_total_connections = next.pool.max_total_connections,
                max_per_route_connections = next.pool.max_per_route_connections,
                "Pool connection limits are read at startup; restart to apply"
            );
        }

        let timeouts = next.pool.timeouts();
        let changed = self.timeouts.send_if_modified(|current| {
            if *current == timeouts {
                false
            } else {
                *current = timeouts;
                true
            }
        });

        tracing::info!(
            timeouts_changed = changed,
            fallback_payloads = next.fallback.payloads.len(),
            "Configuration applied"
        );
    }

    /// Apply updates from the config watcher until the channel closes or
    /// shutdown is signalled.
    pub async fn follow(
        self: Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => self.apply(config),
                    None => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Config follower stopped");
    }
}

impl PayloadLocator for ConfigSource {
    fn location(&self, key: &str) -> Option<String> {
        self.current
            .load()
            .fallback
            .payloads
            .get(key)
            .filter(|location| !location.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn notifies_only_on_timeout_change() {
        let source = ConfigSource::new(ProxyConfig::default());
        let mut rx = source.subscribe_timeouts();

        let mut same = ProxyConfig::default();
        same.fallback.payloads.insert("orders".into(), "orders.json".into());
        source.apply(same);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(source.location("orders").as_deref(), Some("orders.json"));

        let mut faster = ProxyConfig::default();
        faster.pool.socket_timeout_ms = 250;
        source.apply(faster);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().socket, Duration::from_millis(250));
        assert_eq!(source.location("orders"), None);
    }

    #[test]
    fn blank_locations_are_unset() {
        let mut config = ProxyConfig::default();
        config.fallback.payloads.insert("orders".into(), "  ".into());
        let source = ConfigSource::new(config);
        assert_eq!(source.location("orders"), None);
    }
}
