//! Concurrent workload driver for exercising a cube.
//!
//! Each worker draws random coordinate tuples from fixed per-dimension value
//! pools and records a value into the series bound to each tuple. Pools larger
//! than the cube's caps produce cardinality rejections. A non-zero factory
//! delay widens the window in which workers race on the same unseen tuple;
//! the delay is spent in [`tokio::task::block_in_place`], so it needs the
//! multi-threaded runtime.

mod series;

pub use series::{SeriesAggregator, SeriesSnapshot};

use crate::core::{Config, CubeError, Result, WorkloadConfig};
use crate::cube::{CubeStats, MultidimensionalCube, PointResult};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinSet;

/// Outcome counts for one worker, or for a whole run once merged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerOutcome {
    /// Lookups that created their point
    pub created: u64,
    /// Lookups that found an existing point
    pub existing: u64,
    /// Lookups rejected by a node's cardinality cap
    pub cardinality_rejected: u64,
    /// Lookups rejected by the total points limit
    pub total_limit_rejected: u64,
    /// Lookups whose point factory failed
    pub initialization_failed: u64,
    /// Lookups that gave up waiting on a concurrent creator
    pub timed_out: u64,
}

impl WorkerOutcome {
    fn record<P>(&mut self, result: &PointResult<P>) {
        match result {
            PointResult::Created(_) => self.created += 1,
            PointResult::Existing(_) => self.existing += 1,
            PointResult::CardinalityExceeded { .. } => self.cardinality_rejected += 1,
            PointResult::TotalPointsLimitReached => self.total_limit_rejected += 1,
            PointResult::InitializationFailed { .. } => self.initialization_failed += 1,
            PointResult::TimedOut => self.timed_out += 1,
        }
    }

    fn merge(&mut self, other: &WorkerOutcome) {
        self.created += other.created;
        self.existing += other.existing;
        self.cardinality_rejected += other.cardinality_rejected;
        self.total_limit_rejected += other.total_limit_rejected;
        self.initialization_failed += other.initialization_failed;
        self.timed_out += other.timed_out;
    }

    /// Every recorded lookup
    pub fn total(&self) -> u64 {
        self.created
            + self.existing
            + self.cardinality_rejected
            + self.total_limit_rejected
            + self.initialization_failed
            + self.timed_out
    }
}

/// Summary of a finished workload run
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    /// Concurrent workers that ran
    pub workers: usize,
    /// Lookups issued across all workers
    pub operations: u64,
    /// Merged outcome counts
    pub outcomes: WorkerOutcome,
    /// Factory invocations; equals `outcomes.created` plus failed creations
    pub factory_calls: u64,
    /// Sum of the counts recorded into every series
    pub recorded_values: u64,
    /// Series that received the most values
    pub busiest_series: Option<SeriesSnapshot>,
    /// Wall time of the run
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Lookup throughput over `elapsed`
    pub operations_per_second: f64,
    /// Cube state after the run
    pub cube: CubeStats,
}

/// Drives concurrent lookups against a shared cube
pub struct WorkloadRunner {
    cube: Arc<MultidimensionalCube<SeriesAggregator>>,
    workload: WorkloadConfig,
    timeout: Duration,
    next_series_id: Arc<AtomicU64>,
}

impl WorkloadRunner {
    /// Build a runner and its cube from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let cube = MultidimensionalCube::from_config(&config.cube)?;
        Ok(Self::new(
            Arc::new(cube),
            config.workload.clone(),
            config.cube.creation_timeout,
        ))
    }

    /// Build a runner around an existing cube
    pub fn new(
        cube: Arc<MultidimensionalCube<SeriesAggregator>>,
        workload: WorkloadConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            cube,
            workload,
            timeout,
            next_series_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run every worker to completion and summarize the outcomes
    pub async fn run(&self) -> Result<WorkloadReport> {
        if !self.workload.factory_delay.is_zero()
            && Handle::current().runtime_flavor() == RuntimeFlavor::CurrentThread
        {
            return Err(CubeError::config(
                "workload.factory_delay requires a multi-threaded tokio runtime",
            ));
        }

        let workers = self.workload.workers;
        let operations = self.workload.operations_per_worker;
        let pools = Arc::new(value_pools(
            self.cube.dimensionality(),
            self.workload.values_per_dimension,
        ));

        tracing::info!(
            workers,
            operations_per_worker = operations,
            dimensionality = self.cube.dimensionality(),
            values_per_dimension = self.workload.values_per_dimension,
            "Starting cube workload"
        );

        let start = Instant::now();
        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let cube = Arc::clone(&self.cube);
            let pools = Arc::clone(&pools);
            let next_series_id = Arc::clone(&self.next_series_id);
            let timeout = self.timeout;
            let factory_delay = self.workload.factory_delay;

            tasks.spawn(async move {
                run_worker(
                    worker,
                    &cube,
                    &pools,
                    operations,
                    timeout,
                    factory_delay,
                    &next_series_id,
                )
                .await
            });
        }

        let mut outcomes = WorkerOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            outcomes.merge(&joined??);
        }
        let elapsed = start.elapsed();

        let points = self.cube.points();
        let recorded_values: u64 = points.iter().map(|(_, series)| series.count()).sum();
        let busiest_series = points
            .iter()
            .max_by_key(|(_, series)| series.count())
            .map(|(_, series)| series.snapshot());
        let total = outcomes.total();
        let report = WorkloadReport {
            workers,
            operations: total,
            outcomes,
            factory_calls: self.next_series_id.load(Ordering::Relaxed),
            recorded_values,
            busiest_series,
            elapsed,
            operations_per_second: total as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
            cube: self.cube.stats(),
        };

        tracing::info!(
            operations = report.operations,
            created = report.outcomes.created,
            rejected = report.outcomes.cardinality_rejected,
            timed_out = report.outcomes.timed_out,
            elapsed = ?report.elapsed,
            "Cube workload finished"
        );

        Ok(report)
    }
}

async fn run_worker(
    worker: usize,
    cube: &MultidimensionalCube<SeriesAggregator>,
    pools: &[Vec<String>],
    operations: usize,
    timeout: Duration,
    factory_delay: Duration,
    next_series_id: &AtomicU64,
) -> Result<WorkerOutcome> {
    let mut outcome = WorkerOutcome::default();
    let mut coordinates: Vec<&str> = Vec::with_capacity(pools.len());

    for _ in 0..operations {
        coordinates.clear();
        {
            let mut rng = rand::thread_rng();
            coordinates.extend(
                pools
                    .iter()
                    .map(|pool| pool[rng.gen_range(0..pool.len())].as_str()),
            );
        }

        let factory = || {
            if !factory_delay.is_zero() {
                // Hand this worker thread's other tasks off while we block
                tokio::task::block_in_place(|| std::thread::sleep(factory_delay));
            }
            SeriesAggregator::new(next_series_id.fetch_add(1, Ordering::Relaxed))
        };

        let result = cube
            .get_or_create_point_async(coordinates.as_slice(), factory, timeout)
            .await?;
        if let Some(series) = result.point() {
            series.record(1);
        }
        outcome.record(&result);
    }

    tracing::debug!(worker, operations = outcome.total(), "Worker finished");
    Ok(outcome)
}

/// Values `d{dimension}-v{n}` for each dimension
fn value_pools(dimensionality: usize, values_per_dimension: usize) -> Vec<Vec<String>> {
    (0..dimensionality)
        .map(|dimension| {
            (0..values_per_dimension)
                .map(|value| format!("d{}-v{}", dimension, value))
                .collect()
        })
        .collect()
}
