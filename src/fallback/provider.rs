//! Synthetic response lookup with per-key caching.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::fallback::payload::SyntheticPayload;
use crate::fallback::store::{PayloadLocator, PayloadStore};
use crate::observability::metrics;
use crate::routing::CommandKey;

/// No synthetic response can be produced for a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FallbackError {
    #[error("no fallback payload configured for '{key}'")]
    NotConfigured { key: String },

    #[error("fallback payload for '{key}' at '{location}' could not be read: {reason}")]
    Unreadable {
        key: String,
        location: String,
        reason: String,
    },
}

type Cached = Result<Arc<SyntheticPayload>, FallbackError>;

/// Resolves command keys to synthetic payloads.
///
/// The first lookup for a key decides its outcome for the lifetime of the
/// provider: a loaded payload is served from memory afterwards, and a
/// missing or unreadable one keeps failing without touching the store again.
pub struct SyntheticResponseProvider {
    locator: Arc<dyn PayloadLocator>,
    store: Arc<dyn PayloadStore>,
    cache: DashMap<CommandKey, Arc<OnceCell<Cached>>>,
}

impl SyntheticResponseProvider {
    pub fn new(locator: Arc<dyn PayloadLocator>, store: Arc<dyn PayloadStore>) -> Self {
        Self {
            locator,
            store,
            cache: DashMap::new(),
        }
    }

    /// Payload for `key`, loading it on first use.
    pub async fn get(&self, key: &CommandKey) -> Result<Arc<SyntheticPayload>, FallbackError> {
        let cell = self
            .cache
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_init(|| self.load(key)).await.clone()
    }

    /// Number of keys with a settled outcome.
    pub fn cached_keys(&self) -> usize {
        self.cache.iter().filter(|entry| entry.value().initialized()).count()
    }

    async fn load(&self, key: &CommandKey) -> Cached {
        let location = self.locate(key.as_str()).ok_or_else(|| {
            tracing::error!(key = %key, "No fallback payload location configured");
            FallbackError::NotConfigured {
                key: key.to_string(),
            }
        })?;

        match self.store.load(&location).await {
            Ok(bytes) => {
                tracing::info!(key = %key, location = %location, bytes = bytes.len(), "Fallback payload loaded");
                metrics::record_payload_loaded(true);
                Ok(Arc::new(SyntheticPayload::new(location, bytes)))
            }
            Err(e) => {
                tracing::error!(key = %key, location = %location, error = %e, "Fallback payload unreadable");
                metrics::record_payload_loaded(false);
                Err(FallbackError::Unreadable {
                    key: key.to_string(),
                    location,
                    reason: e.to_string(),
                })
            }
        }
    }

    fn locate(&self, key: &str) -> Option<String> {
        if let Some(location) = self.locator.location(key) {
            return Some(location);
        }
        let broader = broader_key(key)?;
        tracing::debug!(key, broader, "Trying broader fallback key");
        self.locator.location(broader)
    }
}

/// Everything before the first `-`, if that is non-empty.
pub fn broader_key(key: &str) -> Option<&str> {
    key.split_once('-')
        .map(|(head, _)| head)
        .filter(|head| !head.is_empty())
}
