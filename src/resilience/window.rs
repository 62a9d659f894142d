//! Rolling success/failure counters.
//!
//! The window is a ring of fixed-width buckets. A bucket is reused once its
//! epoch falls out of the window, so old outcomes age out without a sweeper.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    epoch: u64,
    successes: u64,
    failures: u64,
}

/// Totals over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthCounts {
    pub total: u64,
    pub failures: u64,
}

impl HealthCounts {
    /// Failure percentage, rounded down.
    pub fn error_percentage(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.failures * 100 / self.total
        }
    }

    /// True when the failure ratio is strictly above `threshold` percent.
    pub fn exceeds(&self, threshold: u8) -> bool {
        self.failures * 100 > u64::from(threshold) * self.total
    }
}

/// Bucketed sliding window of call outcomes.
#[derive(Debug)]
pub struct RollingWindow {
    origin: Instant,
    bucket_width: Duration,
    buckets: Mutex<Vec<Bucket>>,
}

impl RollingWindow {
    pub fn new(window: Duration, buckets: u32) -> Self {
        let count = buckets.max(1);
        let bucket_width = (window / count).max(Duration::from_millis(1));
        Self {
            origin: Instant::now(),
            bucket_width,
            buckets: Mutex::new(vec![Bucket::default(); count as usize]),
        }
    }

    /// Record one outcome and return the totals including it.
    pub fn record(&self, failed: bool) -> HealthCounts {
        let epoch = self.current_epoch();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let len = buckets.len();
        let bucket = &mut buckets[(epoch % len as u64) as usize];
        if bucket.epoch != epoch {
            *bucket = Bucket {
                epoch,
                ..Bucket::default()
            };
        }
        if failed {
            bucket.failures += 1;
        } else {
            bucket.successes += 1;
        }
        Self::sum(&buckets, epoch)
    }

    pub fn counts(&self) -> HealthCounts {
        let epoch = self.current_epoch();
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        Self::sum(&buckets, epoch)
    }

    pub fn reset(&self) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.iter_mut().for_each(|b| *b = Bucket::default());
    }

    fn current_epoch(&self) -> u64 {
        (self.origin.elapsed().as_nanos() / self.bucket_width.as_nanos()) as u64
    }

    fn sum(buckets: &[Bucket], epoch: u64) -> HealthCounts {
        let span = buckets.len() as u64;
        buckets
            .iter()
            .filter(|b| b.epoch <= epoch && epoch - b.epoch < span)
            .fold(HealthCounts::default(), |acc, b| HealthCounts {
                total: acc.total + b.successes + b.failures,
                failures: acc.failures + b.failures,
            })
    }
}
