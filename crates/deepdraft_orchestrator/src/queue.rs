//! Bounded concurrency for outbound requests.

use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

/// Limits how many provider calls are in flight at once.
///
/// This is separate from the per-model quotas: it only bounds concurrency.
/// Clones share the same slots.
///
/// # Example
///
/// ```
/// use deepdraft_orchestrator::WorkQueue;
///
/// # #[tokio::main]
/// # async fn main() {
/// let queue = WorkQueue::search();
/// let results = queue
///     .run_all((1..=5).map(|n| async move { n * 2 }))
///     .await;
/// assert_eq!(results, vec![2, 4, 6, 8, 10]);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WorkQueue {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Slot in a [`WorkQueue`], released on drop.
#[derive(Debug)]
pub struct WorkPermit {
    _permit: OwnedSemaphorePermit,
}

impl WorkQueue {
    /// Queue allowing `limit` concurrent tasks (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// One request at a time.
    pub fn serial() -> Self {
        Self::new(1)
    }

    /// Three concurrent requests, for batched search tasks.
    pub fn search() -> Self {
        Self::new(3)
    }

    /// Maximum concurrent tasks.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> WorkPermit {
        // The semaphore is private to the queue and `close` is never called on it.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore should not be closed");
        trace!(available = self.available(), "Work slot acquired");
        WorkPermit { _permit: permit }
    }

    /// Run `task` once a slot is free.
    pub async fn run<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        task.await
    }

    /// Run every task, at most [`limit`](Self::limit) at a time.
    ///
    /// Results come back in input order.
    pub async fn run_all<I, F, T>(&self, tasks: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T>,
    {
        join_all(tasks.into_iter().map(|task| self.run(task))).await
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::serial()
    }
}
