//! Per-function instance pool: an unbounded MPMC FIFO with a factory-on-miss
//! callback.
//!
//! Backed by `crossbeam::queue::SegQueue`, the ecosystem's vetted lock-free
//! MPMC queue, rather than a hand-rolled Michael-Scott list of atomic
//! pointers — `Put`/`Get` retain the source's O(1), never-blocks semantics
//! without unsafe code in this crate. The factory-on-miss wrapper is this
//! crate's own: `SegQueue` has no such callback, so `get()` pops and, on an
//! empty observation, invokes the async factory directly in the caller's
//! task (matching the source's synchronous-call-in-caller behavior, and the
//! same cold-start-stampede tradeoff it documents).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use thiserror::Error;

use crate::instance::Instance;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),
}

type Factory =
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<Arc<Instance>, PoolError>> + Send>> + Send + Sync;

/// A single function's ready pool.
pub struct Pool {
    queue: SegQueue<Arc<Instance>>,
    factory: Arc<Factory>,
}

impl Pool {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<Instance>, PoolError>> + Send + 'static,
    {
        Self {
            queue: SegQueue::new(),
            factory: Arc::new(move || Box::pin(factory())),
        }
    }

    /// Enqueue a ready instance. O(1), never blocks.
    pub fn put(&self, instance: Arc<Instance>) {
        self.queue.push(instance);
    }

    /// Dequeue a ready instance, or invoke the factory exactly once if the
    /// queue was observed empty.
    pub async fn get(&self) -> Result<Arc<Instance>, PoolError> {
        match self.queue.pop() {
            Some(instance) => Ok(instance),
            None => (self.factory)().await,
        }
    }

    /// Current count of ready, unclaimed instances. Racy by nature (another
    /// caller may `get`/`put` concurrently); useful for tests and metrics
    /// only, never for correctness decisions.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
