//! Connection limits shared by every client generation.
//!
//! A call holds one total slot and one slot of its route (scheme, host and
//! port) until the response body is dropped. Both are semaphores, so callers
//! over the limit wait for a slot instead of failing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::pool::PoolError;

#[derive(Debug)]
struct RouteSlots {
    permits: Arc<Semaphore>,
    /// Set on every acquire, cleared by the eviction sweep.
    touched: AtomicBool,
}

/// Total and per-route connection limits.
#[derive(Debug)]
pub struct ConnectionLimiter {
    total: Arc<Semaphore>,
    max_per_route: usize,
    routes: DashMap<String, Arc<RouteSlots>>,
}

impl ConnectionLimiter {
    pub fn new(max_total: usize, max_per_route: usize) -> Self {
        Self {
            total: Arc::new(Semaphore::new(max_total)),
            max_per_route,
            routes: DashMap::new(),
        }
    }

    /// Wait for a connection slot on `route`.
    ///
    /// The route slot is taken before the total one, so callers queued on a
    /// saturated route never hold total slots other routes need.
    pub async fn acquire(&self, route: &str) -> Result<ConnectionPermit, PoolError> {
        let slots = {
            let entry = self.routes.entry(route.to_string()).or_insert_with(|| {
                Arc::new(RouteSlots {
                    permits: Arc::new(Semaphore::new(self.max_per_route)),
                    touched: AtomicBool::new(false),
                })
            });
            entry.touched.store(true, Ordering::Release);
            entry.permits.clone()
        };
        let route_permit = slots.acquire_owned().await.map_err(|_| PoolError::Closed)?;

        let total = self
            .total
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;

        tracing::trace!(
            route,
            available_total = self.total.available_permits(),
            "Connection slot acquired"
        );

        Ok(ConnectionPermit {
            _total: total,
            _route: route_permit,
        })
    }

    /// Forget routes that were idle since the previous sweep and hold no
    /// slots. Returns how many were released. No socket is closed here.
    pub fn evict_idle(&self) -> usize {
        let before = self.routes.len();
        self.routes.retain(|_, slots| {
            if slots.touched.swap(false, Ordering::AcqRel) {
                return true;
            }
            slots.permits.available_permits() < self.max_per_route
        });
        before.saturating_sub(self.routes.len())
    }

    /// Routes currently tracked.
    pub fn tracked_routes(&self) -> usize {
        self.routes.len()
    }

    pub fn available_total(&self) -> usize {
        self.total.available_permits()
    }

    /// Fail every waiting and future acquire.
    pub fn close(&self) {
        self.total.close();
        for entry in self.routes.iter() {
            entry.permits.close();
        }
    }
}

/// A held connection slot. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _total: OwnedSemaphorePermit,
    _route: OwnedSemaphorePermit,
}
