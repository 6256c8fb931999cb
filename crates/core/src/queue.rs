//! Bounded FIFO queue connecting the admission path to the worker.
//!
//! [`BoundedQueue`] holds admitted [`GenerationRequest`]s in strict
//! submission order. Enqueue and depth reads are non-blocking and safe to
//! call from any number of concurrent admission callers; [`dequeue`]
//! suspends the single worker until an item arrives.
//!
//! [`dequeue`]: BoundedQueue::dequeue

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::request::GenerationRequest;

/// Enqueue rejection: the queue already holds `capacity` items.
#[derive(Debug, thiserror::Error)]
#[error("Queue is at capacity ({capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Fixed-capacity FIFO queue of pending generation requests.
pub struct BoundedQueue {
    capacity: usize,
    items: Mutex<VecDeque<GenerationRequest>>,
    notify: Notify,
}

impl BoundedQueue {
    /// Create an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        }
    }

    /// Configured maximum number of pending items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of pending items. Non-blocking.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Append a request at the tail.
    ///
    /// Returns the queue depth after insertion (i.e. the request's
    /// 1-based position), or [`QueueFull`] when at capacity. Never drops
    /// or overwrites existing items.
    pub fn try_enqueue(&self, request: GenerationRequest) -> Result<usize, QueueFull> {
        let depth = {
            let mut items = self.lock();
            if items.len() >= self.capacity {
                return Err(QueueFull {
                    capacity: self.capacity,
                });
            }
            items.push_back(request);
            items.len()
        };
        self.notify.notify_one();
        Ok(depth)
    }

    /// Remove and return the head item, or `None` when empty. Non-blocking.
    pub fn try_dequeue(&self) -> Option<GenerationRequest> {
        self.lock().pop_front()
    }

    /// Remove and return the head item, waiting until one is available.
    ///
    /// This is the worker's single suspension point between jobs. The
    /// caller may race it against a cancellation signal; an item observed
    /// by a dropped wait is left in the queue for the next call.
    pub async fn dequeue(&self) -> GenerationRequest {
        loop {
            // Register interest before checking, so an enqueue landing
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(item) = self.try_dequeue() {
                return item;
            }
            notified.await;
        }
    }

    /// A poisoned lock only means another thread panicked while holding
    /// it; the deque itself is still structurally valid, so recover the
    /// guard rather than propagating the panic into the pipeline.
    fn lock(&self) -> MutexGuard<'_, VecDeque<GenerationRequest>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
