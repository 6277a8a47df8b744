//! Leaf slot holding a point that may still be under construction.
//!
//! The caller that inserts a slot is its creator and is the only one that
//! runs the factory. Everyone else resolving the same tuple waits here, either
//! blocking on a condvar or suspending on a `Notify`, bounded by their own
//! timeout.

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// State of a slot as seen by a waiter
pub(crate) enum Settled<P> {
    Ready(Arc<P>),
    Failed(Arc<str>),
    Pending,
}

enum Phase {
    Pending,
    Ready,
    Failed(Arc<str>),
}

pub(crate) struct PointSlot<P> {
    point: ArcSwapOption<P>,
    phase: Mutex<Phase>,
    settled: Condvar,
    settled_async: Notify,
}

impl<P> PointSlot<P> {
    pub(crate) fn pending() -> Self {
        Self {
            point: ArcSwapOption::empty(),
            phase: Mutex::new(Phase::Pending),
            settled: Condvar::new(),
            settled_async: Notify::new(),
        }
    }

    /// Lock-free read of the bound point
    #[inline]
    pub(crate) fn resolved(&self) -> Option<Arc<P>> {
        self.point.load_full()
    }

    /// Bind the point; ignored once the slot has settled
    pub(crate) fn complete(&self, point: Arc<P>) {
        {
            let mut phase = self.phase.lock();
            if !matches!(*phase, Phase::Pending) {
                return;
            }
            self.point.store(Some(point));
            *phase = Phase::Ready;
        }
        self.wake_all();
    }

    pub(crate) fn fail(&self, reason: Arc<str>) {
        {
            let mut phase = self.phase.lock();
            if !matches!(*phase, Phase::Pending) {
                return;
            }
            *phase = Phase::Failed(reason);
        }
        self.wake_all();
    }

    fn wake_all(&self) {
        self.settled.notify_all();
        self.settled_async.notify_waiters();
    }

    pub(crate) fn peek(&self) -> Settled<P> {
        let phase = self.phase.lock();
        self.read(&phase)
    }

    fn read(&self, phase: &Phase) -> Settled<P> {
        match phase {
            Phase::Pending => Settled::Pending,
            Phase::Failed(reason) => Settled::Failed(Arc::clone(reason)),
            Phase::Ready => match self.point.load_full() {
                Some(point) => Settled::Ready(point),
                None => Settled::Pending,
            },
        }
    }

    /// Block until the creator settles the slot or `timeout` elapses
    pub(crate) fn wait(&self, timeout: Duration) -> Settled<P> {
        if let Some(point) = self.resolved() {
            return Settled::Ready(point);
        }

        // An unrepresentable deadline means wait without bound
        let deadline = Instant::now().checked_add(timeout);
        let mut phase = self.phase.lock();
        while matches!(*phase, Phase::Pending) {
            match deadline {
                Some(deadline) => {
                    if self.settled.wait_until(&mut phase, deadline).timed_out() {
                        break;
                    }
                },
                None => self.settled.wait(&mut phase),
            }
        }
        self.read(&phase)
    }

    /// Suspend until the creator settles the slot or `timeout` elapses
    pub(crate) async fn wait_async(&self, timeout: Duration) -> Settled<P> {
        if let Some(point) = self.resolved() {
            return Settled::Ready(point);
        }

        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            let notified = self.settled_async.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed
            notified.as_mut().enable();

            match self.peek() {
                Settled::Pending => {},
                settled => return settled,
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.peek();
                    }
                },
                None => notified.await,
            }
        }
    }
}
