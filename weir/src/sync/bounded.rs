//! Bounded blocking queue for producer/consumer hand-off between threads.
//!
//! [`BoundedQueue`] owns a fixed number of slots arranged as a ring. Producers
//! block in [`put`] while every slot is occupied; consumers block in [`take`]
//! while none is.
//!
//! # Algorithm
//!
//! The classic two-semaphore construction:
//!
//! - `empty_slots` starts at `capacity`, `filled_slots` starts at 0
//! - **put**: acquire `empty_slots`, lock the ring, write at `tail`, unlock,
//!   release `filled_slots`
//! - **take**: acquire `filled_slots`, lock the ring, read at `head`, unlock,
//!   release `empty_slots`
//!
//! Waiting happens on the semaphores only. The ring lock covers nothing but
//! the slot access and index update, so a blocked producer never holds
//! anything a consumer needs (and vice versa).
//!
//! # Ordering
//!
//! With one producer and one consumer, items come out in the order they went
//! in. With several producers or consumers only slot order is preserved:
//! two producers racing in `put` may land in either order, and two consumers
//! may return their items to the caller in either order.
//!
//! # Closing
//!
//! [`close`] wakes every blocked thread. Pending and later puts and takes
//! fail with [`QueueError::Closed`]; items still buffered can be recovered
//! with [`drain`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use weir::BoundedQueue;
//!
//! let queue = Arc::new(BoundedQueue::new(4)?);
//!
//! let producer = {
//!     let queue = Arc::clone(&queue);
//!     std::thread::spawn(move || {
//!         for i in 0..10 {
//!             queue.put(i).expect("queue closed");
//!         }
//!     })
//! };
//!
//! for expected in 0..10 {
//!     assert_eq!(queue.take()?, expected);
//! }
//! producer.join().unwrap();
//! # Ok::<(), weir::QueueError>(())
//! ```
//!
//! [`put`]: BoundedQueue::put
//! [`take`]: BoundedQueue::take
//! [`close`]: BoundedQueue::close
//! [`drain`]: BoundedQueue::drain

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::Timeout;
use super::semaphore::{AcquireError, Semaphore};
use crate::error::{PutError, QueueError};
use crate::ring::Ring;
use crate::trace::{debug, info, trace};

/// Coarse fill level of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupancy {
    /// No items buffered.
    Empty,
    /// Some slots used, some free.
    Partial,
    /// Every slot occupied.
    Full,
}

/// State guarded by the exclusion lock.
struct Shared<T> {
    ring: Ring<T>,
    closed: bool,
}

/// Fixed-capacity FIFO queue with blocking put and take.
///
/// Share it between threads with `Arc`. See the [module docs](self) for the
/// ordering contract.
pub struct BoundedQueue<T> {
    capacity: usize,
    shared: Mutex<Shared<T>>,
    /// Counts free slots; producers wait here.
    empty_slots: Semaphore,
    /// Counts occupied slots; consumers wait here.
    filled_slots: Semaphore,
}

/// Maps a failed permit acquisition to the queue-level error.
///
/// `exhausted` is what running out of permits means for the caller's side.
const fn acquire_failed(err: AcquireError, exhausted: QueueError) -> QueueError {
    match err {
        AcquireError::Closed => QueueError::Closed,
        AcquireError::Timeout => QueueError::Timeout,
        AcquireError::NoPermits => exhausted,
    }
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue with `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidCapacity`] if `capacity` is 0.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }

        debug!(capacity, "bounded queue created");
        Ok(Self {
            capacity,
            shared: Mutex::new(Shared {
                ring: Ring::with_capacity(capacity),
                closed: false,
            }),
            empty_slots: Semaphore::new(capacity),
            filled_slots: Semaphore::new(0),
        })
    }

    // Critical sections only move items and bump indices; a panic elsewhere
    // cannot leave the ring inconsistent, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Puts `item` at the back, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] (with the item) if the queue is closed
    /// before the item could be stored.
    pub fn put(&self, item: T) -> Result<(), PutError<T>> {
        self.put_blocking(item, Timeout::Infinite)
    }

    /// Puts `item` at the back, blocking for at most `timeout` while the
    /// queue is full.
    ///
    /// # Errors
    ///
    /// The item is handed back with:
    /// - [`QueueError::Closed`] if the queue is or becomes closed
    /// - [`QueueError::Timeout`] if no slot frees up in time
    pub fn put_blocking(&self, item: T, timeout: Timeout) -> Result<(), PutError<T>> {
        if let Err(err) = self.empty_slots.acquire_timeout(timeout) {
            return Err(PutError::new(item, acquire_failed(err, QueueError::Full)));
        }
        self.insert(item)
    }

    /// Shorthand for [`put_blocking`](Self::put_blocking) with a duration.
    ///
    /// # Errors
    ///
    /// See [`put_blocking`](Self::put_blocking).
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        self.put_blocking(item, Timeout::Duration(timeout))
    }

    /// Puts `item` at the back only if a slot is free right now.
    ///
    /// # Errors
    ///
    /// The item is handed back with:
    /// - [`QueueError::Full`] if every slot is occupied
    /// - [`QueueError::Closed`] if the queue is closed
    pub fn try_put(&self, item: T) -> Result<(), PutError<T>> {
        if let Err(err) = self.empty_slots.try_acquire() {
            return Err(PutError::new(item, acquire_failed(err, QueueError::Full)));
        }
        self.insert(item)
    }

    /// Takes the item at the front, blocking while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue is closed before an item
    /// could be taken.
    pub fn take(&self) -> Result<T, QueueError> {
        self.take_blocking(Timeout::Infinite)
    }

    /// Takes the item at the front, blocking for at most `timeout` while the
    /// queue is empty.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Closed`] if the queue is or becomes closed
    /// - [`QueueError::Timeout`] if no item arrives in time
    pub fn take_blocking(&self, timeout: Timeout) -> Result<T, QueueError> {
        self.filled_slots
            .acquire_timeout(timeout)
            .map_err(|err| acquire_failed(err, QueueError::Empty))?;
        self.remove()
    }

    /// Shorthand for [`take_blocking`](Self::take_blocking) with a duration.
    ///
    /// # Errors
    ///
    /// See [`take_blocking`](Self::take_blocking).
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        self.take_blocking(Timeout::Duration(timeout))
    }

    /// Takes the item at the front only if one is available right now.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Empty`] if nothing is buffered
    /// - [`QueueError::Closed`] if the queue is closed
    pub fn try_take(&self) -> Result<T, QueueError> {
        self.filled_slots
            .try_acquire()
            .map_err(|err| acquire_failed(err, QueueError::Empty))?;
        self.remove()
    }

    /// Writes into the slot reserved by an `empty_slots` permit.
    fn insert(&self, item: T) -> Result<(), PutError<T>> {
        let mut shared = self.lock();
        if shared.closed {
            return Err(PutError::new(item, QueueError::Closed));
        }
        // The permit guarantees a free slot.
        let pushed = shared.ring.push(item);
        drop(shared);

        match pushed {
            Ok(()) => {
                self.filled_slots.release();
                Ok(())
            }
            Err(item) => Err(PutError::new(item, QueueError::Full)),
        }
    }

    /// Reads from the slot reserved by a `filled_slots` permit.
    fn remove(&self) -> Result<T, QueueError> {
        let mut shared = self.lock();
        if shared.closed {
            return Err(QueueError::Closed);
        }
        // The permit guarantees an occupied slot.
        let popped = shared.ring.pop();
        drop(shared);

        let item = popped.ok_or(QueueError::Empty)?;
        self.empty_slots.release();
        Ok(item)
    }

    /// Closes the queue, waking every blocked producer and consumer.
    ///
    /// After this, every put and take fails with [`QueueError::Closed`].
    /// Buffered items stay in place until [`drain`](Self::drain)ed or the
    /// queue is dropped.
    ///
    /// Returns `true` if this call closed the queue, `false` if it was
    /// already closed.
    pub fn close(&self) -> bool {
        let mut shared = self.lock();
        if shared.closed {
            return false;
        }
        shared.closed = true;
        info!(
            capacity = self.capacity,
            remaining = shared.ring.len(),
            "bounded queue closed"
        );
        drop(shared);

        self.empty_slots.close();
        self.filled_slots.close();
        true
    }

    /// Removes and returns every item still buffered in a closed queue, in
    /// FIFO order.
    ///
    /// Returns an empty vector while the queue is open; draining an open
    /// queue would let takers and the slot counts disagree.
    pub fn drain(&self) -> Vec<T> {
        let mut shared = self.lock();
        if !shared.closed {
            return Vec::new();
        }
        let items = shared.ring.drain();
        trace!(drained = items.len(), "drained closed queue");
        items
    }

    /// Number of slots, fixed at construction.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered items at the moment of the call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ring.len()
    }

    /// Returns `true` if no items are buffered at the moment of the call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every slot is occupied at the moment of the call.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Fill level at the moment of the call.
    #[must_use]
    pub fn occupancy(&self) -> Occupancy {
        match self.len() {
            0 => Occupancy::Empty,
            n if n == self.capacity => Occupancy::Full,
            _ => Occupancy::Partial,
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.lock();
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("len", &shared.ring.len())
            .field("closed", &shared.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        let err = BoundedQueue::<u8>::new(0).unwrap_err();
        assert_eq!(err, QueueError::InvalidCapacity(0));
    }

    #[test]
    fn test_basic_put_take() {
        let queue = BoundedQueue::new(8).unwrap();

        queue.put(42).unwrap();
        assert_eq!(queue.take(), Ok(42));
        assert_eq!(queue.try_take(), Err(QueueError::Empty));
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4).unwrap();

        queue.put('A').unwrap();
        queue.put('B').unwrap();
        queue.put('C').unwrap();

        assert_eq!(queue.take(), Ok('A'));
        assert_eq!(queue.take(), Ok('B'));
        assert_eq!(queue.take(), Ok('C'));
    }

    #[test]
    fn test_occupancy_transitions() {
        let queue = BoundedQueue::new(2).unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Empty);

        queue.put(1).unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Partial);

        queue.put(2).unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Full);
        assert!(queue.is_full());

        queue.take().unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Partial);

        queue.take().unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Empty);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_slot_goes_empty_to_full() {
        let queue = BoundedQueue::new(1).unwrap();

        queue.put(()).unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Full);
        queue.take().unwrap();
        assert_eq!(queue.occupancy(), Occupancy::Empty);
    }

    #[test]
    fn test_try_put_full() {
        let queue = BoundedQueue::new(2).unwrap();

        queue.try_put(1).unwrap();
        queue.try_put(2).unwrap();

        let err = queue.try_put(3).unwrap_err();
        assert_eq!(err.reason(), QueueError::Full);
        assert_eq!(err.into_inner(), 3);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_len_stays_in_bounds() {
        let queue = BoundedQueue::new(3).unwrap();

        for step in 0..50u32 {
            if step % 3 == 2 {
                let _ = queue.try_take();
            } else {
                let _ = queue.try_put(step);
            }
            assert!(queue.len() <= queue.capacity());
        }
        assert!(queue.is_full());
    }

    #[test]
    fn test_wrapping_behavior() {
        let queue = BoundedQueue::new(4).unwrap();

        for round in 0..5 {
            for i in 0..4 {
                queue.put(round * 10 + i).unwrap();
            }
            for i in 0..4 {
                assert_eq!(queue.take(), Ok(round * 10 + i));
            }
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn test_put_timeout_on_full() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.put(1).unwrap();

        let err = queue.put_timeout(2, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.reason(), QueueError::Timeout);
        assert_eq!(err.into_inner(), 2);
        assert_eq!(queue.take(), Ok(1));
    }

    #[test]
    fn test_take_timeout_on_empty() {
        let queue = BoundedQueue::<u32>::new(1).unwrap();
        assert_eq!(
            queue.take_timeout(Duration::from_millis(20)),
            Err(QueueError::Timeout)
        );
    }

    #[test]
    fn test_close_rejects_new_calls() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.put(1).unwrap();

        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());

        assert_eq!(queue.put(2).unwrap_err().reason(), QueueError::Closed);
        assert_eq!(queue.try_put(2).unwrap_err().reason(), QueueError::Closed);
        assert_eq!(queue.take(), Err(QueueError::Closed));
        assert_eq!(queue.try_take(), Err(QueueError::Closed));
        assert_eq!(
            queue.take_timeout(Duration::from_millis(5)),
            Err(QueueError::Closed)
        );
    }

    #[test]
    fn test_drain_after_close() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.put("a").unwrap();
        queue.put("b").unwrap();

        assert!(queue.drain().is_empty(), "open queue must not drain");
        assert_eq!(queue.len(), 2);

        queue.close();
        assert_eq!(queue.drain(), vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_debug_format() {
        let queue = BoundedQueue::new(3).unwrap();
        queue.put(1).unwrap();
        assert_eq!(
            format!("{queue:?}"),
            "BoundedQueue { capacity: 3, len: 1, closed: false }"
        );
    }

    #[test]
    fn test_close_after_permit_rejects_insert() {
        let queue = BoundedQueue::new(2).unwrap();

        // A producer that already holds a free-slot permit when close lands.
        queue.empty_slots.try_acquire().unwrap();
        queue.close();

        let err = queue.insert("late").unwrap_err();
        assert_eq!(err.reason(), QueueError::Closed);
        assert_eq!(err.into_inner(), "late");
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_close_after_permit_keeps_item_for_drain() {
        let queue = BoundedQueue::new(2).unwrap();
        queue.put(7).unwrap();

        // A consumer that already holds a filled-slot permit when close lands.
        queue.filled_slots.try_acquire().unwrap();
        queue.close();

        assert_eq!(queue.remove(), Err(QueueError::Closed));
        assert_eq!(queue.drain(), vec![7]);
    }

    #[test]
    fn test_state_queries_follow_close() {
        let queue = BoundedQueue::new(1).unwrap();
        assert!(queue.is_empty() && !queue.is_full() && !queue.is_closed());

        queue.put(1).unwrap();
        assert!(!queue.is_empty() && queue.is_full());

        queue.close();
        assert!(queue.is_closed() && queue.is_full());
    }

    #[test]
    fn test_non_copy_type() {
        let queue = BoundedQueue::new(8).unwrap();

        queue.put("hello".to_string()).unwrap();
        queue.put("world".to_string()).unwrap();

        assert_eq!(queue.take().as_deref(), Ok("hello"));
        assert_eq!(queue.take().as_deref(), Ok("world"));
    }
}
