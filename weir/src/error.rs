//! Error types surfaced by [`BoundedQueue`](crate::BoundedQueue).

use std::fmt;

use thiserror::Error;

/// Why a queue operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was constructed with zero slots.
    #[error("invalid capacity {0}: a queue needs at least one slot")]
    InvalidCapacity(usize),
    /// The queue has been closed; no further transfers happen.
    #[error("queue closed")]
    Closed,
    /// A bounded wait expired before a slot or an item became available.
    #[error("timed out waiting on queue")]
    Timeout,
    /// Non-blocking put found every slot occupied.
    #[error("queue full")]
    Full,
    /// Non-blocking take found no item.
    #[error("queue empty")]
    Empty,
}

/// A failed put, handing the rejected item back to the caller.
///
/// `reason` is one of [`QueueError::Closed`], [`QueueError::Timeout`] or
/// [`QueueError::Full`].
#[derive(Error)]
#[error("{reason}")]
pub struct PutError<T> {
    item: T,
    reason: QueueError,
}

impl<T> PutError<T> {
    pub(crate) const fn new(item: T, reason: QueueError) -> Self {
        Self { item, reason }
    }

    /// Why the item was rejected.
    #[must_use]
    pub const fn reason(&self) -> QueueError {
        self.reason
    }

    /// Recovers the item that could not be enqueued.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.item
    }
}

// Manual impl so that `PutError<T>` is usable for any `T`, debuggable or not.
impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl<T> From<PutError<T>> for QueueError {
    fn from(err: PutError<T>) -> Self {
        err.reason
    }
}
