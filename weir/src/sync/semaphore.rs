//! Counting semaphore with close support.
//!
//! A [`Semaphore`] tracks a number of available permits. [`acquire`] takes
//! one, blocking while none are left; [`release`] returns one and wakes a
//! single waiter. The bounded queue uses two of them: one counting empty
//! slots, one counting filled slots.
//!
//! Unlike a plain counting semaphore this one can be [`close`]d. Closing wakes
//! every waiter and makes all current and future acquires fail with
//! [`AcquireError::Closed`], so a blocked thread always has a way out.
//!
//! The permit count lives behind a [`Mutex`] and waiters sleep on a
//! [`Condvar`]. The lock is held only to inspect or adjust the count, never
//! while the caller works with whatever the permit guards.
//!
//! [`acquire`]: Semaphore::acquire
//! [`release`]: Semaphore::release
//! [`close`]: Semaphore::close

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use minstant::Instant;
use thiserror::Error;

use super::Timeout;
use crate::trace::trace;

/// Why a permit could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The semaphore has been closed.
    #[error("semaphore closed")]
    Closed,
    /// The deadline passed while waiting for a permit.
    #[error("timed out waiting for a permit")]
    Timeout,
    /// No permit was available and the caller asked not to wait.
    #[error("no permits available")]
    NoPermits,
}

struct Permits {
    available: usize,
    closed: bool,
}

/// Counting semaphore whose waiters can be released by [`close`](Self::close).
///
/// Which waiter a [`release`](Self::release) wakes is unspecified.
pub struct Semaphore {
    state: Mutex<Permits>,
    cond: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    #[must_use]
    pub const fn new(permits: usize) -> Self {
        Self {
            state: Mutex::new(Permits {
                available: permits,
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    // Nothing inside the critical section can panic, so a poisoned lock
    // still guards a consistent count.
    fn lock(&self) -> MutexGuard<'_, Permits> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a permit, blocking until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Closed`] if the semaphore is closed before a
    /// permit could be taken.
    pub fn acquire(&self) -> Result<(), AcquireError> {
        self.acquire_timeout(Timeout::Infinite)
    }

    /// Takes a permit, blocking for at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`AcquireError::Closed`] if the semaphore is or becomes closed
    /// - [`AcquireError::Timeout`] if the deadline passes first
    pub fn acquire_timeout(&self, timeout: Timeout) -> Result<(), AcquireError> {
        let deadline = timeout.deadline();
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(AcquireError::Closed);
            }
            if state.available > 0 {
                state.available -= 1;
                return Ok(());
            }

            trace!("no permits, waiting");
            state = match deadline {
                None => self
                    .cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(dl) => {
                    let remaining = dl
                        .checked_duration_since(Instant::now())
                        .filter(|d| !d.is_zero());
                    let Some(remaining) = remaining else {
                        trace!("permit wait timed out");
                        return Err(AcquireError::Timeout);
                    };
                    self.cond
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
            // Woken by release, close, timeout or spuriously: re-check.
        }
    }

    /// Takes a permit if one is available right now.
    ///
    /// # Errors
    ///
    /// - [`AcquireError::Closed`] if the semaphore is closed
    /// - [`AcquireError::NoPermits`] if no permit is available
    pub fn try_acquire(&self) -> Result<(), AcquireError> {
        let mut state = self.lock();
        if state.closed {
            return Err(AcquireError::Closed);
        }
        if state.available == 0 {
            return Err(AcquireError::NoPermits);
        }
        state.available -= 1;
        Ok(())
    }

    /// Returns a permit and wakes one waiter, if any.
    pub fn release(&self) {
        let mut state = self.lock();
        state.available += 1;
        drop(state);
        self.cond.notify_one();
    }

    /// Closes the semaphore and wakes every waiter.
    ///
    /// Returns `true` if this call closed it, `false` if it was already
    /// closed.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);
        self.cond.notify_all();
        true
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of permits available at the moment of the call.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock().available
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Semaphore")
            .field("available", &state.available)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_counts_down() {
        let sema = Semaphore::new(2);

        assert_eq!(sema.acquire(), Ok(()));
        assert_eq!(sema.available(), 1);
        assert_eq!(sema.acquire(), Ok(()));
        assert_eq!(sema.available(), 0);
        assert_eq!(sema.try_acquire(), Err(AcquireError::NoPermits));
    }

    #[test]
    fn test_release_adds_permit() {
        let sema = Semaphore::new(0);

        assert_eq!(sema.try_acquire(), Err(AcquireError::NoPermits));
        sema.release();
        assert_eq!(sema.available(), 1);
        assert_eq!(sema.try_acquire(), Ok(()));
    }

    #[test]
    fn test_release_wakes_waiter() {
        let sema = Arc::new(Semaphore::new(0));
        let acquired = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let sema = Arc::clone(&sema);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                sema.acquire().unwrap();
                acquired.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        sema.release();
        waiter.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(sema.available(), 0);
    }

    #[test]
    fn test_timeout_expires() {
        let sema = Semaphore::new(0);

        let start = std::time::Instant::now();
        let result = sema.acquire_timeout(Duration::from_millis(30).into());
        assert_eq!(result, Err(AcquireError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_timeout_succeeds_when_available() {
        let sema = Semaphore::new(1);
        assert_eq!(
            sema.acquire_timeout(Timeout::Duration(Duration::ZERO)),
            Ok(())
        );
    }

    #[test]
    fn test_close_wakes_all_waiters() {
        let sema = Arc::new(Semaphore::new(0));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let sema = Arc::clone(&sema);
                thread::spawn(move || sema.acquire())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        assert!(sema.close());

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(AcquireError::Closed));
        }
    }

    #[test]
    fn test_close_is_sticky() {
        let sema = Semaphore::new(3);

        assert!(sema.close());
        assert!(!sema.close());
        assert!(sema.is_closed());

        // Permits left over are unreachable once closed.
        assert_eq!(sema.try_acquire(), Err(AcquireError::Closed));
        assert_eq!(sema.acquire(), Err(AcquireError::Closed));
        sema.release();
        assert_eq!(sema.try_acquire(), Err(AcquireError::Closed));
    }

    #[test]
    fn test_permits_are_conserved_under_contention() {
        let sema = Arc::new(Semaphore::new(3));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let sema = Arc::clone(&sema);
                let inside = Arc::clone(&inside);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..200 {
                        sema.acquire().unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        sema.release();
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(sema.available(), 3);
    }
}
