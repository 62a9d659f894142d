//! Where fallback payloads come from.
//!
//! `PayloadLocator` answers "which location is configured for this key" and
//! `PayloadStore` turns a location into bytes.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::future::BoxFuture;

/// Resolves a command key to a configured payload location.
pub trait PayloadLocator: Send + Sync {
    fn location(&self, key: &str) -> Option<String>;
}

impl PayloadLocator for HashMap<String, String> {
    fn location(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Loads payload bytes from a location.
pub trait PayloadStore: Send + Sync {
    fn load<'a>(&'a self, location: &'a str) -> BoxFuture<'a, io::Result<Bytes>>;
}

/// Reads payloads from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsPayloadStore {
    base_dir: Option<PathBuf>,
}

impl FsPayloadStore {
    /// Relative locations are resolved against `base_dir` when given.
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl PayloadStore for FsPayloadStore {
    fn load<'a>(&'a self, location: &'a str) -> BoxFuture<'a, io::Result<Bytes>> {
        let path = self.resolve(location);
        Box::pin(async move { tokio::fs::read(&path).await.map(Bytes::from) })
    }
}
