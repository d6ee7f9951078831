//! Bounded worker pool with backpressure.
//!
//! # Responsibilities
//! - Bound the number of concurrently handled connections to a fixed capacity
//! - Block the accept loop when every slot is taken (backpressure)
//! - Track in-flight work so shutdown can drain it
//!
//! # Design Decisions
//! - Capacity is enforced with a semaphore: one permit per connection slot.
//!   The permit is held for the whole lifetime of the connection task and
//!   released on completion or panic, so a failing task never leaks a slot
//!   or disturbs the other workers.
//! - The pool never cancels running tasks; stopping the flow of new work is
//!   the accept loop's job.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::net::connection::{ConnectionId, ConnectionTracker};

/// A fixed-capacity pool of connection-handling tasks.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    tracker: ConnectionTracker,
}

impl WorkerPool {
    /// Create a pool that runs at most `capacity` tasks concurrently.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Reserve a worker slot, waiting until one is free.
    ///
    /// This is the backpressure point: when all slots are taken the caller
    /// blocks here instead of queueing work unboundedly.
    pub async fn acquire(&self) -> WorkerPermit {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore closed unexpectedly");

        WorkerPermit { _permit: permit }
    }

    /// Run a connection task on a previously reserved slot.
    ///
    /// The slot and the tracker entry are released when the task finishes,
    /// including by panic.
    pub fn spawn<F, Fut>(&self, permit: WorkerPermit, work: F)
    where
        F: FnOnce(ConnectionId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = self.tracker.track();
        tokio::spawn(async move {
            let _permit = permit;
            let id = guard.id();
            work(id).await;
            drop(guard);
        });
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently free worker slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of tasks currently running.
    pub fn active(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Wait for in-flight tasks to finish, up to `grace`.
    pub async fn drain(&self, grace: Duration) {
        if tokio::time::timeout(grace, self.tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Shutdown grace period expired with connections still active"
            );
        }
    }
}

/// A reserved worker slot.
///
/// When dropped, the slot is released back to the pool. This holds even if
/// the connection handler panics.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_blocks_at_capacity() {
        let pool = WorkerPool::new(2);
        let held1 = pool.acquire().await;
        let _held2 = pool.acquire().await;
        assert_eq!(pool.available(), 0);

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(blocked.is_err(), "third acquire must wait for a free slot");

        drop(held1);
        let unblocked = tokio::time::timeout(Duration::from_millis(200), pool.acquire()).await;
        assert!(unblocked.is_ok(), "released slot must unblock a waiter");
    }

    #[tokio::test]
    async fn panicking_task_releases_slot() {
        let pool = WorkerPool::new(1);
        let permit = pool.acquire().await;
        pool.spawn(permit, |_id| async {
            panic!("task failure must not poison the pool");
        });

        let reacquired = tokio::time::timeout(Duration::from_secs(1), pool.acquire()).await;
        assert!(reacquired.is_ok(), "slot must be released after a panic");
    }

    #[tokio::test]
    async fn drain_waits_for_running_tasks() {
        let pool = WorkerPool::new(4);
        let permit = pool.acquire().await;
        pool.spawn(permit, |_id| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        pool.drain(Duration::from_secs(2)).await;
        assert_eq!(pool.active(), 0);
    }
}
