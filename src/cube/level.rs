//! One node of the cube: a capped mapping from a dimension value to a child.
//!
//! Lookups of existing keys only touch a `DashMap` shard. Inserts take the
//! node's own insert lock so the cap check and the insert are one step; no
//! other node is involved. Detaching an empty child takes the parent's lock
//! and then the child's, never the reverse.

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Result of [`Level::get_or_try_insert`]
pub(crate) enum Insertion<T> {
    /// Key was already present
    Found(Arc<T>),
    /// Key was absent and the new child is now bound to it. `saturated` is
    /// set for the one insert that first filled the node to its cap.
    Inserted { child: Arc<T>, saturated: bool },
    /// Key was absent and the node is at its cap
    CapReached,
    /// The node was detached from the cube; walk again from the root
    Retired,
}

#[derive(Default)]
struct InsertState {
    saturated: bool,
    retired: bool,
}

/// Capped map from dimension value to child, for a single node of the cube
pub(crate) struct Level<T> {
    children: DashMap<Arc<str>, Arc<T>, RandomState>,
    state: Mutex<InsertState>,
    len: AtomicUsize,
    cap: usize,
}

impl<T> Level<T> {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            children: DashMap::with_hasher(RandomState::new()),
            state: Mutex::new(InsertState::default()),
            len: AtomicUsize::new(0),
            cap,
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.children.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Return the child for `key`, inserting one built by `make` if absent.
    ///
    /// The cap is re-checked under the insert lock, so racing inserts cannot
    /// push the node past its cap. `make` runs under that lock and must be
    /// cheap.
    pub(crate) fn get_or_try_insert<F>(&self, key: &str, make: F) -> Insertion<T>
    where
        F: FnOnce() -> T,
    {
        if let Some(child) = self.get(key) {
            return Insertion::Found(child);
        }

        let mut state = self.state.lock();
        if state.retired {
            return Insertion::Retired;
        }

        // Double-check: another caller may have inserted while we waited
        if let Some(child) = self.get(key) {
            return Insertion::Found(child);
        }

        let len = self.len.load(Ordering::Acquire);
        if len >= self.cap {
            return Insertion::CapReached;
        }

        let child = Arc::new(make());
        self.children.insert(Arc::from(key), Arc::clone(&child));
        self.len.store(len + 1, Ordering::Release);

        let saturated = !state.saturated && len + 1 >= self.cap;
        state.saturated |= saturated;
        Insertion::Inserted { child, saturated }
    }

    /// Remove `key` only if it is still bound to `child`
    pub(crate) fn remove_if_same(&self, key: &str, child: &Arc<T>) -> bool {
        let _state = self.state.lock();

        let removed = self
            .children
            .remove_if(key, |_, current| Arc::ptr_eq(current, child))
            .is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::Release);
        }
        removed
    }

    /// Remove `key` if it is still bound to `child` and `retire` gives the
    /// child up. `retire` runs under this node's insert lock.
    pub(crate) fn remove_retired<F>(&self, key: &str, child: &Arc<T>, retire: F) -> bool
    where
        F: FnOnce(&T) -> bool,
    {
        let _state = self.state.lock();

        let bound = self
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(&current, child));
        if !bound || !retire(&**child) {
            return false;
        }

        self.children.remove(key);
        self.len.fetch_sub(1, Ordering::Release);
        true
    }

    /// Refuse all further inserts if the node is empty.
    ///
    /// Callers already holding this node see [`Insertion::Retired`] and walk
    /// again instead of inserting into a node nobody can reach.
    pub(crate) fn retire_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if self.is_empty() {
            state.retired = true;
        }
        state.retired
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub(crate) fn cap(&self) -> usize {
        self.cap
    }

    /// Snapshot of the current `(key, child)` pairs
    pub(crate) fn entries(&self) -> Vec<(Arc<str>, Arc<T>)> {
        self.children
            .iter()
            .map(|entry| (Arc::clone(entry.key()), Arc::clone(entry.value())))
            .collect()
    }
}
