//! Shared queue of pending command results.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::pending::PendingResult;

/// Unordered multi-producer, multi-consumer queue of [`PendingResult`]s.
///
/// Producers never block beyond the internal lock. Consumers either poll with
/// [`ResultQueue::try_pop`] or wait a bounded time with
/// [`ResultQueue::pop_timeout`]. Resolution order is unrelated to push order.
#[derive(Debug, Default)]
pub struct ResultQueue {
    items: Mutex<VecDeque<PendingResult>>,
    available: Condvar,
}

impl ResultQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pending result and wakes one waiting consumer.
    pub fn push(&self, pending: PendingResult) {
        self.lock().push_back(pending);
        self.available.notify_one();
    }

    /// Removes a pending result without blocking.
    #[must_use]
    pub fn try_pop(&self) -> Option<PendingResult> {
        self.lock().pop_front()
    }

    /// Removes a pending result, waiting at most `timeout` for one to arrive.
    #[must_use]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PendingResult> {
        let guard = self.lock();
        let (mut items, _) = self
            .available
            .wait_timeout_while(guard, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        items.pop_front()
    }

    /// Number of queued results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the deque half-updated, so
    // the poisoned guard is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingResult>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
