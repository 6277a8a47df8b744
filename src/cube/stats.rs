//! Outcome counters for a cube.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a cube's size and lookup outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CubeStats {
    /// Length of every coordinate tuple
    pub dimensionality: usize,
    /// Points bound or being created
    pub total_points: usize,
    /// Upper bound on `total_points`
    pub total_points_limit: usize,
    /// Lookups that created a point
    pub created: u64,
    /// Lookups that found a bound point
    pub existing: u64,
    /// Lookups rejected by a node's cap
    pub cardinality_rejections: u64,
    /// Lookups rejected by the total points limit
    pub total_limit_rejections: u64,
    /// Failed or panicked factories, counted once per caller told about it
    pub initialization_failures: u64,
    /// Waits on a concurrent creator that ran out of time
    pub timeouts: u64,
    /// Nodes that have reached their cardinality cap
    pub saturated_nodes: u64,
}

impl CubeStats {
    /// All lookups that returned a point
    pub fn successes(&self) -> u64 {
        self.created + self.existing
    }

    /// All lookups that did not return a point
    pub fn failures(&self) -> u64 {
        self.cardinality_rejections
            + self.total_limit_rejections
            + self.initialization_failures
            + self.timeouts
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) created: AtomicU64,
    pub(crate) existing: AtomicU64,
    pub(crate) cardinality_rejections: AtomicU64,
    pub(crate) total_limit_rejections: AtomicU64,
    pub(crate) initialization_failures: AtomicU64,
    pub(crate) timeouts: AtomicU64,
    pub(crate) saturated_nodes: AtomicU64,
}

impl Counters {
    #[inline(always)]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, stats: &mut CubeStats) {
        stats.created = self.created.load(Ordering::Relaxed);
        stats.existing = self.existing.load(Ordering::Relaxed);
        stats.cardinality_rejections = self.cardinality_rejections.load(Ordering::Relaxed);
        stats.total_limit_rejections = self.total_limit_rejections.load(Ordering::Relaxed);
        stats.initialization_failures = self.initialization_failures.load(Ordering::Relaxed);
        stats.timeouts = self.timeouts.load(Ordering::Relaxed);
        stats.saturated_nodes = self.saturated_nodes.load(Ordering::Relaxed);
    }
}
