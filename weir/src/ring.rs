//! Fixed-capacity circular storage.
//!
//! [`Ring`] is plain data: it performs no synchronization of its own. The
//! queue keeps it behind a mutex and only touches it inside that exclusion
//! region, so slot reads, slot writes and index updates are never observed
//! half-done.

/// Circular buffer of `capacity` slots with read (`head`) and write (`tail`)
/// cursors.
///
/// Invariants:
/// - `head` and `tail` are always in `[0, capacity)`
/// - `count` is the number of occupied slots, `0 <= count <= capacity`
/// - the occupied slots are exactly `head, head + 1, ..., head + count - 1`
///   (mod `capacity`), and `tail == (head + count) % capacity`
pub(crate) struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> Ring<T> {
    /// Creates an empty ring.
    ///
    /// `capacity` must be non-zero; the queue validates this before calling.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "ring capacity must be greater than 0");
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Advances a cursor to the next slot index, wrapping to 0 at capacity.
    ///
    /// Equivalent to `(cursor + 1) % capacity` without the division.
    #[inline]
    fn bump_cursor(&self, cursor: usize) -> usize {
        let next = cursor + 1;
        if next == self.capacity() { 0 } else { next }
    }

    /// Writes `item` at `tail`.
    ///
    /// Returns `Err(item)` if every slot is occupied.
    pub(crate) fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }

        let slot = &mut self.slots[self.tail];
        debug_assert!(slot.is_none(), "write cursor landed on an occupied slot");
        *slot = Some(item);

        self.tail = self.bump_cursor(self.tail);
        self.count += 1;
        Ok(())
    }

    /// Reads the item at `head`, or `None` if the ring is empty.
    pub(crate) fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }

        let item = self.slots[self.head].take();
        debug_assert!(item.is_some(), "read cursor landed on an empty slot");

        self.head = self.bump_cursor(self.head);
        self.count -= 1;
        item
    }

    /// Removes every buffered item in FIFO order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.count);
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }
}
