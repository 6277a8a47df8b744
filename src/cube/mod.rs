//! Concurrent multidimensional metric cube.
//!
//! A cube maps a fixed-length tuple of dimension values to a point, usually
//! an aggregator handle for one metric series. Each dimension is a level of
//! nested maps:
//!
//! ```text
//! root ─┬─ "GET" ─┬─ "200" ──▶ point
//!       │         └─ "500" ──▶ point
//!       └─ "PUT" ─── "200" ──▶ point
//! ```
//!
//! - Points are created lazily on the first lookup of a tuple.
//! - Every node holds at most `cardinality_caps[depth]` distinct values, and
//!   the cube holds at most `total_points_limit` points.
//! - When callers race on an unseen tuple, exactly one of them runs the
//!   factory. The others wait for it, each bounded by its own timeout.
//! - Contention is per node: inserting under one parent never blocks lookups
//!   or inserts under another.
//! - A rejected or failed creation leaves nothing behind: no slot, and no
//!   branch that would hold a cardinality slot at an upper level.
//!
//! # Example
//!
//! ```
//! use metricube_lib::cube::{MultidimensionalCube, PointResult};
//! use std::time::Duration;
//!
//! let cube = MultidimensionalCube::new(vec![2, 2]).unwrap();
//! let timeout = Duration::from_millis(100);
//!
//! let first = cube.get_or_create_point(&["x", "p"], || 0u64, timeout).unwrap();
//! assert!(first.is_point_created_new());
//!
//! cube.get_or_create_point(&["x", "q"], || 0u64, timeout).unwrap();
//! let full = cube.get_or_create_point(&["x", "r"], || 0u64, timeout).unwrap();
//! assert_eq!(full.failure_coordinate_index(), Some(1));
//!
//! let again = cube.get_or_create_point(&["x", "p"], || 1u64, timeout).unwrap();
//! assert!(matches!(again, PointResult::Existing(_)));
//! ```

mod level;
mod result;
mod slot;
mod stats;

pub use result::{PointResult, ResultCodes};
pub use stats::CubeStats;

use crate::core::{CubeConfig, CubeError, Result};
use level::{Insertion, Level};
use slot::{PointSlot, Settled};
use smallvec::SmallVec;
use stats::Counters;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A node is either a branch to the next dimension or the leaf dimension
enum Node<P> {
    Branch(Level<Node<P>>),
    Leaf(Level<PointSlot<P>>),
}

impl<P> Node<P> {
    fn for_depth(depth: usize, caps: &[usize]) -> Self {
        if depth + 1 == caps.len() {
            Node::Leaf(Level::new(caps[depth]))
        } else {
            Node::Branch(Level::new(caps[depth]))
        }
    }

    fn retire_if_empty(&self) -> bool {
        match self {
            Node::Branch(level) => level.retire_if_empty(),
            Node::Leaf(level) => level.retire_if_empty(),
        }
    }
}

/// Where a lookup ended up before any waiting
enum Resolution<P> {
    Done(PointResult<P>),
    Wait(Arc<PointSlot<P>>),
}

/// Outcome of inserting a tuple's path while holding a point reservation
enum Walk<P> {
    /// The leaf slot already existed
    Found(Arc<PointSlot<P>>),
    /// This caller inserted the pending slot under `leaf`
    Inserted {
        leaf: Arc<Node<P>>,
        slot: Arc<PointSlot<P>>,
    },
    /// The node at this coordinate index is at its cap
    Rejected(usize),
    /// A node on the path was detached mid-walk
    Retry,
}

/// Thread-safe N-dimensional map from coordinate tuples to points
pub struct MultidimensionalCube<P> {
    root: Arc<Node<P>>,
    caps: Vec<usize>,
    total_points_limit: usize,
    total_points: AtomicUsize,
    counters: Counters,
}

impl<P> MultidimensionalCube<P> {
    /// Create a cube with one cardinality cap per dimension and no total limit
    pub fn new(cardinality_caps: Vec<usize>) -> Result<Self> {
        Self::with_limits(cardinality_caps, usize::MAX)
    }

    /// Create a cube bounded both per node and in total points
    pub fn with_limits(cardinality_caps: Vec<usize>, total_points_limit: usize) -> Result<Self> {
        if cardinality_caps.is_empty() {
            return Err(CubeError::invalid_cube("a cube needs at least one dimension"));
        }
        if let Some(index) = cardinality_caps.iter().position(|&cap| cap == 0) {
            return Err(CubeError::invalid_cube(format!(
                "cardinality cap for dimension {} must be greater than 0",
                index
            )));
        }
        if total_points_limit == 0 {
            return Err(CubeError::invalid_cube("total points limit must be greater than 0"));
        }

        tracing::debug!(
            dimensionality = cardinality_caps.len(),
            caps = ?cardinality_caps,
            total_points_limit,
            "Created multidimensional cube"
        );

        Ok(Self {
            root: Arc::new(Node::for_depth(0, &cardinality_caps)),
            caps: cardinality_caps,
            total_points_limit,
            total_points: AtomicUsize::new(0),
            counters: Counters::default(),
        })
    }

    /// Create a cube from the `cube` section of the configuration
    pub fn from_config(config: &CubeConfig) -> Result<Self> {
        config.validate()?;
        Self::with_limits(config.cardinality_caps.clone(), config.total_points_limit)
    }

    /// Number of values in every coordinate tuple
    #[inline]
    pub fn dimensionality(&self) -> usize {
        self.caps.len()
    }

    /// Per-node cap on distinct values, by dimension
    #[inline]
    pub fn cardinality_caps(&self) -> &[usize] {
        &self.caps
    }

    /// Maximum number of points; `usize::MAX` when unbounded
    #[inline]
    pub fn total_points_limit(&self) -> usize {
        self.total_points_limit
    }

    /// Points bound or being created right now
    #[inline]
    pub fn total_points_count(&self) -> usize {
        self.total_points.load(Ordering::Acquire)
    }

    /// Look up the point for `coordinates`, creating it with `factory` on a miss.
    ///
    /// If another caller is already creating the same point, waits up to
    /// `timeout` for it and returns [`PointResult::TimedOut`] if it is still
    /// pending. Fails only if `coordinates` has the wrong length.
    pub fn get_or_create_point<S, F>(
        &self,
        coordinates: &[S],
        factory: F,
        timeout: Duration,
    ) -> Result<PointResult<P>>
    where
        S: AsRef<str>,
        F: FnOnce() -> P,
    {
        self.get_or_create_point_with(coordinates, || Ok::<P, Infallible>(factory()), timeout)
    }

    /// Like [`get_or_create_point`](Self::get_or_create_point) with a fallible factory.
    ///
    /// A factory error yields [`PointResult::InitializationFailed`] and leaves
    /// the tuple unbound, so a later call can retry.
    pub fn get_or_create_point_with<S, F, E>(
        &self,
        coordinates: &[S],
        factory: F,
        timeout: Duration,
    ) -> Result<PointResult<P>>
    where
        S: AsRef<str>,
        F: FnOnce() -> std::result::Result<P, E>,
        E: fmt::Display,
    {
        Ok(match self.resolve(coordinates, factory)? {
            Resolution::Done(result) => result,
            Resolution::Wait(slot) => self.finish_wait(slot.wait(timeout)),
        })
    }

    /// Async form of [`get_or_create_point`](Self::get_or_create_point).
    ///
    /// The factory still runs inline; only waiting on a concurrent creator
    /// suspends instead of blocking the thread.
    pub async fn get_or_create_point_async<S, F>(
        &self,
        coordinates: &[S],
        factory: F,
        timeout: Duration,
    ) -> Result<PointResult<P>>
    where
        S: AsRef<str>,
        F: FnOnce() -> P,
    {
        self.get_or_create_point_with_async(coordinates, || Ok::<P, Infallible>(factory()), timeout)
            .await
    }

    /// Async form of [`get_or_create_point_with`](Self::get_or_create_point_with)
    pub async fn get_or_create_point_with_async<S, F, E>(
        &self,
        coordinates: &[S],
        factory: F,
        timeout: Duration,
    ) -> Result<PointResult<P>>
    where
        S: AsRef<str>,
        F: FnOnce() -> std::result::Result<P, E>,
        E: fmt::Display,
    {
        Ok(match self.resolve(coordinates, factory)? {
            Resolution::Done(result) => result,
            Resolution::Wait(slot) => self.finish_wait(slot.wait_async(timeout).await),
        })
    }

    /// Return the point bound to `coordinates` without creating or waiting
    pub fn try_get_point<S: AsRef<str>>(&self, coordinates: &[S]) -> Result<Option<Arc<P>>> {
        self.check_dimensionality(coordinates.len())?;
        Ok(self.find_slot(coordinates).and_then(|slot| slot.resolved()))
    }

    /// Snapshot of every bound point with its coordinates
    pub fn points(&self) -> Vec<(Vec<Arc<str>>, Arc<P>)> {
        let mut points = Vec::with_capacity(self.total_points_count());
        let mut path: SmallVec<[Arc<str>; 8]> = SmallVec::new();
        Self::collect_points(&self.root, &mut path, &mut points);
        points
    }

    fn collect_points(
        node: &Node<P>,
        path: &mut SmallVec<[Arc<str>; 8]>,
        points: &mut Vec<(Vec<Arc<str>>, Arc<P>)>,
    ) {
        match node {
            Node::Branch(level) => {
                for (key, child) in level.entries() {
                    path.push(key);
                    Self::collect_points(&child, path, points);
                    path.pop();
                }
            },
            Node::Leaf(level) => {
                for (key, slot) in level.entries() {
                    if let Some(point) = slot.resolved() {
                        let mut coordinates = path.to_vec();
                        coordinates.push(key);
                        points.push((coordinates, point));
                    }
                }
            },
        }
    }

    /// Sorted distinct values present at dimension `index` across all nodes
    pub fn dimension_values(&self, index: usize) -> Result<Vec<Arc<str>>> {
        if index >= self.dimensionality() {
            return Err(CubeError::DimensionOutOfRange {
                index,
                dimensionality: self.dimensionality(),
            });
        }

        let mut values = BTreeSet::new();
        let mut frontier = vec![Arc::clone(&self.root)];
        for depth in 0..=index {
            let mut next = Vec::new();
            for node in &frontier {
                match &**node {
                    Node::Branch(level) => {
                        for (key, child) in level.entries() {
                            if depth == index {
                                values.insert(key);
                            } else {
                                next.push(child);
                            }
                        }
                    },
                    Node::Leaf(level) => {
                        values.extend(level.entries().into_iter().map(|(key, _)| key));
                    },
                }
            }
            frontier = next;
        }

        Ok(values.into_iter().collect())
    }

    /// Current size and outcome counters
    pub fn stats(&self) -> CubeStats {
        let mut stats = CubeStats {
            dimensionality: self.dimensionality(),
            total_points: self.total_points_count(),
            total_points_limit: self.total_points_limit,
            ..CubeStats::default()
        };
        self.counters.snapshot(&mut stats);
        stats
    }

    fn check_dimensionality(&self, actual: usize) -> Result<()> {
        if actual == self.dimensionality() {
            Ok(())
        } else {
            Err(CubeError::dimensionality(self.dimensionality(), actual))
        }
    }

    /// Lock-free walk to the leaf slot of a tuple, if every node exists
    fn find_slot<S: AsRef<str>>(&self, coordinates: &[S]) -> Option<Arc<PointSlot<P>>> {
        let mut node = Arc::clone(&self.root);
        for value in coordinates {
            let child = match &*node {
                Node::Branch(level) => level.get(value.as_ref())?,
                Node::Leaf(level) => return level.get(value.as_ref()),
            };
            node = child;
        }
        None
    }

    fn found(&self, slot: Arc<PointSlot<P>>) -> Resolution<P> {
        match slot.resolved() {
            Some(point) => Resolution::Done(self.existing(point)),
            None => Resolution::Wait(slot),
        }
    }

    /// Find the tuple's slot or insert it, then run the factory if this
    /// caller inserted the slot.
    ///
    /// A point is reserved against the total limit before any node is
    /// created, so a rejected tuple leaves the cube unchanged.
    fn resolve<S, F, E>(&self, coordinates: &[S], factory: F) -> Result<Resolution<P>>
    where
        S: AsRef<str>,
        F: FnOnce() -> std::result::Result<P, E>,
        E: fmt::Display,
    {
        self.check_dimensionality(coordinates.len())?;

        if let Some(slot) = self.find_slot(coordinates) {
            return Ok(self.found(slot));
        }

        if !self.reserve_point() {
            // The tuple may have been bound since the first look
            if let Some(slot) = self.find_slot(coordinates) {
                return Ok(self.found(slot));
            }
            Counters::bump(&self.counters.total_limit_rejections);
            tracing::debug!(
                limit = self.total_points_limit,
                "Rejected new point: total points limit reached"
            );
            return Ok(Resolution::Done(PointResult::TotalPointsLimitReached));
        }

        loop {
            match self.insert_path(coordinates) {
                Walk::Found(slot) => {
                    self.release_point();
                    return Ok(self.found(slot));
                },
                Walk::Inserted { leaf, slot } => {
                    return Ok(Resolution::Done(self.create(&leaf, coordinates, &slot, factory)));
                },
                Walk::Rejected(index) => {
                    self.release_point();
                    let value = coordinates[index].as_ref();
                    return Ok(Resolution::Done(self.reject_cardinality(index, value)));
                },
                Walk::Retry => continue,
            }
        }
    }

    /// Walk the tuple, inserting missing nodes and finally a pending leaf slot
    fn insert_path<S: AsRef<str>>(&self, coordinates: &[S]) -> Walk<P> {
        let leaf_index = self.dimensionality() - 1;
        let mut node = Arc::clone(&self.root);

        for (index, value) in coordinates[..leaf_index].iter().enumerate() {
            let Node::Branch(level) = &*node else {
                unreachable!("node at depth {} must be a branch", index);
            };

            let child = match level
                .get_or_try_insert(value.as_ref(), || Node::for_depth(index + 1, &self.caps))
            {
                Insertion::Found(child) => child,
                Insertion::Inserted { child, saturated } => {
                    self.note_insert(level, index, saturated);
                    child
                },
                Insertion::CapReached => return Walk::Rejected(index),
                Insertion::Retired => return Walk::Retry,
            };
            node = child;
        }

        let Node::Leaf(leaf) = &*node else {
            unreachable!("node at depth {} must be a leaf", leaf_index);
        };

        match leaf.get_or_try_insert(coordinates[leaf_index].as_ref(), PointSlot::pending) {
            Insertion::Found(slot) => Walk::Found(slot),
            Insertion::Inserted { child, saturated } => {
                self.note_insert(leaf, leaf_index, saturated);
                Walk::Inserted {
                    leaf: Arc::clone(&node),
                    slot: child,
                }
            },
            Insertion::CapReached => Walk::Rejected(leaf_index),
            Insertion::Retired => Walk::Retry,
        }
    }

    /// Run the factory for a slot this caller inserted
    fn create<S, F, E>(
        &self,
        leaf: &Node<P>,
        coordinates: &[S],
        slot: &Arc<PointSlot<P>>,
        factory: F,
    ) -> PointResult<P>
    where
        S: AsRef<str>,
        F: FnOnce() -> std::result::Result<P, E>,
        E: fmt::Display,
    {
        let Node::Leaf(leaf) = leaf else {
            unreachable!("pending slots live in leaf nodes");
        };
        let mut guard = CreationGuard {
            cube: self,
            leaf,
            coordinates,
            slot,
            armed: true,
        };

        match factory() {
            Ok(point) => {
                let point = Arc::new(point);
                slot.complete(Arc::clone(&point));
                guard.armed = false;
                Counters::bump(&self.counters.created);
                PointResult::Created(point)
            },
            Err(e) => {
                let reason: Arc<str> = Arc::from(e.to_string());
                tracing::warn!(value = guard.key(), error = %reason, "Point factory failed");
                guard.abandon(Arc::clone(&reason));
                Counters::bump(&self.counters.initialization_failures);
                PointResult::InitializationFailed { reason }
            },
        }
    }

    /// Detach branches along `coordinates` that a failed creation left empty.
    ///
    /// Runs deepest first and stops at the first node that still has children.
    fn prune_empty_branches<S: AsRef<str>>(&self, coordinates: &[S]) {
        let prefix = &coordinates[..self.dimensionality() - 1];
        let mut trail: SmallVec<[Arc<Node<P>>; 8]> = SmallVec::new();
        trail.push(Arc::clone(&self.root));

        for value in prefix {
            let child = match trail.last().map(|node| &**node) {
                Some(Node::Branch(level)) => level.get(value.as_ref()),
                _ => None,
            };
            match child {
                Some(child) => trail.push(child),
                None => break,
            }
        }

        for depth in (1..trail.len()).rev() {
            let Node::Branch(parent) = &*trail[depth - 1] else {
                break;
            };
            let value = prefix[depth - 1].as_ref();
            if !parent.remove_retired(value, &trail[depth], Node::retire_if_empty) {
                break;
            }
            tracing::debug!(
                dimension = depth - 1,
                value,
                "Removed empty branch after failed creation"
            );
        }
    }

    fn finish_wait(&self, settled: Settled<P>) -> PointResult<P> {
        match settled {
            Settled::Ready(point) => self.existing(point),
            Settled::Failed(reason) => {
                Counters::bump(&self.counters.initialization_failures);
                PointResult::InitializationFailed { reason }
            },
            Settled::Pending => {
                Counters::bump(&self.counters.timeouts);
                tracing::debug!("Timed out waiting for a concurrent point creation");
                PointResult::TimedOut
            },
        }
    }

    #[inline]
    fn existing(&self, point: Arc<P>) -> PointResult<P> {
        Counters::bump(&self.counters.existing);
        PointResult::Existing(point)
    }

    fn reject_cardinality(&self, index: usize, value: &str) -> PointResult<P> {
        Counters::bump(&self.counters.cardinality_rejections);
        tracing::debug!(
            dimension = index,
            value,
            cap = self.caps[index],
            "Rejected new dimension value: cardinality cap reached"
        );
        PointResult::CardinalityExceeded {
            coordinate_index: index,
        }
    }

    fn note_insert<T>(&self, level: &Level<T>, index: usize, saturated: bool) {
        if saturated {
            Counters::bump(&self.counters.saturated_nodes);
            tracing::info!(
                dimension = index,
                cap = level.cap(),
                "Cube node reached its cardinality cap"
            );
        }
    }

    fn reserve_point(&self) -> bool {
        let limit = self.total_points_limit;
        self.total_points
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < limit).then_some(count + 1)
            })
            .is_ok()
    }

    fn release_point(&self) {
        self.total_points.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<P> fmt::Debug for MultidimensionalCube<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultidimensionalCube")
            .field("cardinality_caps", &self.caps)
            .field("total_points_limit", &self.total_points_limit)
            .field("total_points", &self.total_points_count())
            .finish()
    }
}

/// Unbinds a pending slot if its creator fails or unwinds, so waiters wake
/// up and the tuple can be retried.
struct CreationGuard<'a, P, S: AsRef<str>> {
    cube: &'a MultidimensionalCube<P>,
    leaf: &'a Level<PointSlot<P>>,
    coordinates: &'a [S],
    slot: &'a Arc<PointSlot<P>>,
    armed: bool,
}

impl<P, S: AsRef<str>> CreationGuard<'_, P, S> {
    fn key(&self) -> &str {
        self.coordinates[self.coordinates.len() - 1].as_ref()
    }

    fn abandon(&mut self, reason: Arc<str>) {
        self.armed = false;
        self.slot.fail(reason);
        if self.leaf.remove_if_same(self.key(), self.slot) {
            self.cube.release_point();
            self.cube.prune_empty_branches(self.coordinates);
        }
    }
}

impl<P, S: AsRef<str>> Drop for CreationGuard<'_, P, S> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(value = self.key(), "Point factory panicked");
            self.abandon(Arc::from("point factory panicked"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn create(cube: &MultidimensionalCube<String>, coordinates: &[&str]) -> PointResult<String> {
        let label = coordinates.join("/");
        cube.get_or_create_point(coordinates, move || label, TIMEOUT).unwrap()
    }

    fn create_u32(cube: &MultidimensionalCube<u32>, coordinates: &[&str]) -> PointResult<u32> {
        cube.get_or_create_point(coordinates, || 7, TIMEOUT).unwrap()
    }

    #[test]
    fn test_two_dimension_scenario() {
        let cube = MultidimensionalCube::new(vec![2, 2]).unwrap();

        assert!(create(&cube, &["x", "p"]).is_point_created_new());
        assert!(create(&cube, &["x", "q"]).is_point_created_new());

        let rejected = create(&cube, &["x", "r"]);
        assert!(!rejected.is_success());
        assert_eq!(rejected.failure_coordinate_index(), Some(1));
        assert_eq!(
            rejected.result_code(),
            ResultCodes::FAILURE_SUBDIMENSIONS_COUNT_LIMIT_REACHED
        );

        assert!(create(&cube, &["y", "p"]).is_point_created_new());
        assert_eq!(cube.total_points_count(), 3);
    }

    #[test]
    fn test_relookup_returns_same_point() {
        let cube = MultidimensionalCube::new(vec![4, 4, 4]).unwrap();

        let first = create(&cube, &["GET", "200", "eu"]).into_point().unwrap();
        let second = cube
            .get_or_create_point(&["GET", "200", "eu"], || "other".to_string(), TIMEOUT)
            .unwrap();

        assert!(matches!(second, PointResult::Existing(_)));
        assert!(Arc::ptr_eq(&first, second.point().unwrap()));
        assert_eq!(second.point().unwrap().as_str(), "GET/200/eu");
    }

    #[test]
    fn test_existing_keys_resolve_after_cap() {
        let cube = MultidimensionalCube::new(vec![3]).unwrap();

        for value in ["a", "b", "c"] {
            assert!(create(&cube, &[value]).is_point_created_new());
        }
        assert_eq!(create(&cube, &["d"]).failure_coordinate_index(), Some(0));
        for value in ["a", "b", "c"] {
            assert!(matches!(create(&cube, &[value]), PointResult::Existing(_)));
        }
    }

    #[test]
    fn test_cap_on_intermediate_level() {
        let cube = MultidimensionalCube::new(vec![1, 10]).unwrap();

        assert!(create(&cube, &["svc-a", "op"]).is_success());
        let rejected = create(&cube, &["svc-b", "op"]);
        assert_eq!(rejected.failure_coordinate_index(), Some(0));
        assert_eq!(cube.dimension_values(0).unwrap().len(), 1);
    }

    #[test]
    fn test_wrong_length_fails_fast() {
        let cube: MultidimensionalCube<u32> = MultidimensionalCube::new(vec![2, 2]).unwrap();

        let err = cube.get_or_create_point(&["x"], || 1, TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            CubeError::DimensionalityMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert!(cube.try_get_point(&["x", "y", "z"]).is_err());
        assert_eq!(cube.total_points_count(), 0);
    }

    #[test]
    fn test_invalid_construction() {
        assert!(MultidimensionalCube::<u32>::new(Vec::new()).is_err());
        assert!(MultidimensionalCube::<u32>::new(vec![3, 0]).is_err());
        assert!(MultidimensionalCube::<u32>::with_limits(vec![3], 0).is_err());
    }

    #[test]
    fn test_total_points_limit() {
        let cube = MultidimensionalCube::with_limits(vec![10, 10], 2).unwrap();

        assert!(create(&cube, &["a", "1"]).is_success());
        assert!(create(&cube, &["b", "1"]).is_success());

        let rejected = create(&cube, &["a", "2"]);
        assert!(matches!(rejected, PointResult::TotalPointsLimitReached));
        assert_eq!(rejected.failure_coordinate_index(), None);
        assert!(cube.try_get_point(&["a", "2"]).unwrap().is_none());

        // Existing points are unaffected by the limit
        assert!(matches!(create(&cube, &["a", "1"]), PointResult::Existing(_)));
        assert_eq!(cube.stats().total_limit_rejections, 1);
    }

    #[test]
    fn test_failed_factory_frees_slot() {
        let cube: MultidimensionalCube<u32> =
            MultidimensionalCube::with_limits(vec![1], 1).unwrap();

        let failed = cube
            .get_or_create_point_with(&["a"], || Err::<u32, _>("backend unavailable"), TIMEOUT)
            .unwrap();
        match &failed {
            PointResult::InitializationFailed { reason } => {
                assert_eq!(&**reason, "backend unavailable");
            },
            other => panic!("Expected initialization failure, got {:?}", other),
        }
        assert!(failed.is_retryable());
        assert_eq!(cube.total_points_count(), 0);

        // Neither the node cap nor the total limit kept the failed key
        let retried = cube.get_or_create_point(&["b"], || 5, TIMEOUT).unwrap();
        assert!(retried.is_point_created_new());
    }

    #[test]
    fn test_failed_creation_leaves_no_branch_behind() {
        let cube: MultidimensionalCube<u32> = MultidimensionalCube::new(vec![2, 2]).unwrap();

        for value in ["bad1", "bad2"] {
            let failed = cube
                .get_or_create_point_with(&[value, "p"], || Err::<u32, _>("unavailable"), TIMEOUT)
                .unwrap();
            assert!(matches!(failed, PointResult::InitializationFailed { .. }));
        }
        assert!(cube.points().is_empty());
        assert!(cube.dimension_values(0).unwrap().is_empty());

        // Both root slots are free again
        for value in ["good1", "good2"] {
            let created = cube.get_or_create_point(&[value, "p"], || 1, TIMEOUT).unwrap();
            assert!(created.is_point_created_new());
        }
    }

    #[test]
    fn test_failed_creation_keeps_populated_branch() {
        let cube = MultidimensionalCube::new(vec![2, 2]).unwrap();
        create(&cube, &["x", "p"]);

        let failed = cube
            .get_or_create_point_with(&["x", "q"], || Err::<String, _>("unavailable"), TIMEOUT)
            .unwrap();
        assert!(failed.is_retryable());
        assert_eq!(cube.dimension_values(0).unwrap(), vec![Arc::<str>::from("x")]);
        assert_eq!(cube.dimension_values(1).unwrap(), vec![Arc::<str>::from("p")]);
        assert!(cube.try_get_point(&["x", "p"]).unwrap().is_some());

        assert!(create(&cube, &["x", "q"]).is_point_created_new());
    }

    #[test]
    fn test_total_limit_leaves_no_branch_behind() {
        let cube = MultidimensionalCube::with_limits(vec![2, 2], 1).unwrap();
        create(&cube, &["a", "1"]);

        assert!(matches!(create(&cube, &["b", "1"]), PointResult::TotalPointsLimitReached));
        assert_eq!(cube.dimension_values(0).unwrap(), vec![Arc::<str>::from("a")]);
        assert_eq!(cube.stats().saturated_nodes, 0);
    }

    #[test]
    fn test_panicking_factory_in_nested_cube_leaves_no_branch_behind() {
        let cube: MultidimensionalCube<u32> = MultidimensionalCube::new(vec![1, 1, 1]).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cube.get_or_create_point(&["a", "b", "c"], || panic!("factory bug"), TIMEOUT)
        }));
        assert!(outcome.is_err());
        assert!(cube.dimension_values(0).unwrap().is_empty());

        assert!(create_u32(&cube, &["z", "y", "x"]).is_point_created_new());
    }

    #[test]
    fn test_panicking_factory_frees_slot() {
        let cube: MultidimensionalCube<u32> = MultidimensionalCube::new(vec![1]).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cube.get_or_create_point(&["a"], || panic!("factory bug"), TIMEOUT)
        }));
        assert!(outcome.is_err());
        assert_eq!(cube.total_points_count(), 0);

        assert!(cube
            .get_or_create_point(&["a"], || 1, TIMEOUT)
            .unwrap()
            .is_point_created_new());
    }

    #[test]
    fn test_try_get_point_never_creates() {
        let cube = MultidimensionalCube::new(vec![2, 2]).unwrap();

        assert!(cube.try_get_point(&["x", "p"]).unwrap().is_none());
        assert!(cube.dimension_values(0).unwrap().is_empty());

        let created = create(&cube, &["x", "p"]).into_point().unwrap();
        let found = cube.try_get_point(&["x", "p"]).unwrap().unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert!(cube.try_get_point(&["x", "q"]).unwrap().is_none());
    }

    #[test]
    fn test_points_and_dimension_values() {
        let cube = MultidimensionalCube::new(vec![4, 4]).unwrap();
        create(&cube, &["b", "2"]);
        create(&cube, &["a", "1"]);
        create(&cube, &["a", "2"]);

        let mut points: Vec<String> = cube
            .points()
            .into_iter()
            .map(|(coordinates, point)| {
                let joined: Vec<&str> = coordinates.iter().map(|c| &**c).collect();
                assert_eq!(joined.join("/"), *point);
                joined.join("/")
            })
            .collect();
        points.sort();
        assert_eq!(points, vec!["a/1", "a/2", "b/2"]);

        let level0: Vec<String> = cube
            .dimension_values(0)
            .unwrap()
            .iter()
            .map(|value| value.to_string())
            .collect();
        assert_eq!(level0, vec!["a", "b"]);
        let level1 = cube.dimension_values(1).unwrap();
        assert_eq!(level1.len(), 2);
        assert!(matches!(
            cube.dimension_values(2),
            Err(CubeError::DimensionOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn test_stats_track_outcomes() {
        let cube = MultidimensionalCube::new(vec![1, 1]).unwrap();
        create(&cube, &["a", "1"]);
        create(&cube, &["a", "1"]);
        create(&cube, &["a", "2"]);
        create(&cube, &["b", "1"]);

        let stats = cube.stats();
        assert_eq!(stats.dimensionality, 2);
        assert_eq!(stats.created, 1);
        assert_eq!(stats.existing, 1);
        assert_eq!(stats.cardinality_rejections, 2);
        assert_eq!(stats.saturated_nodes, 2);
        assert_eq!(stats.total_points, 1);

        // Refilling a node after a failed creation does not count it again
        let cube: MultidimensionalCube<u32> = MultidimensionalCube::new(vec![1]).unwrap();
        cube.get_or_create_point_with(&["a"], || Err::<u32, _>("unavailable"), TIMEOUT)
            .unwrap();
        create_u32(&cube, &["b"]);
        assert_eq!(cube.stats().saturated_nodes, 1);
    }

    #[test]
    fn test_from_config() {
        let config = CubeConfig {
            cardinality_caps: vec![5, 6],
            total_points_limit: 7,
            creation_timeout: TIMEOUT,
        };
        let cube: MultidimensionalCube<u32> = MultidimensionalCube::from_config(&config).unwrap();
        assert_eq!(cube.cardinality_caps(), &[5, 6]);
        assert_eq!(cube.total_points_limit(), 7);
        assert_eq!(cube.dimensionality(), 2);
    }
}
