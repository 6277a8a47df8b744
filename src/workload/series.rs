//! Point payload used by the workload: a lock-free count/sum aggregator.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregator handle bound to one coordinate tuple
#[derive(Debug)]
pub struct SeriesAggregator {
    id: u64,
    count: AtomicU64,
    sum: AtomicU64,
}

/// Copy of an aggregator's state at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesSnapshot {
    /// Order in which the series was created within a run
    pub id: u64,
    /// Values recorded
    pub count: u64,
    /// Sum of the recorded values
    pub sum: u64,
}

impl SeriesAggregator {
    /// Empty aggregator with the given creation serial
    pub fn new(id: u64) -> Self {
        Self {
            id,
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
        }
    }

    /// Add one value
    #[inline(always)]
    pub fn record(&self, value: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
    }

    /// Values recorded so far
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of the values recorded so far
    #[inline]
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    /// Copy the current count and sum
    pub fn snapshot(&self) -> SeriesSnapshot {
        SeriesSnapshot {
            id: self.id,
            count: self.count(),
            sum: self.sum(),
        }
    }
}
