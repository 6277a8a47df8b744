//! Common test utilities and fixtures.

#![allow(dead_code)]

use metricube_lib::cube::MultidimensionalCube;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Generous wait budget for tests that expect creations to complete
pub const LONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Point payload that remembers which factory call built it.
#[derive(Debug)]
pub struct TestSeries {
    pub serial: usize,
    pub label: String,
}

/// Counts factory invocations across threads.
#[derive(Debug, Clone, Default)]
pub struct FactoryCounter {
    calls: Arc<AtomicUsize>,
}

impl FactoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series and count the call
    pub fn make(&self, label: &str) -> TestSeries {
        let serial = self.calls.fetch_add(1, Ordering::SeqCst);
        TestSeries {
            serial,
            label: label.to_string(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Cube with the given caps shared behind an `Arc`
pub fn shared_cube(caps: &[usize]) -> Arc<MultidimensionalCube<TestSeries>> {
    Arc::new(MultidimensionalCube::new(caps.to_vec()).expect("valid cube"))
}
