//! Blocking synchronization primitives for in-process communication.
//!
//! - [`semaphore`] - counting signal with blocking acquire and close
//! - [`bounded`] - fixed-capacity producer/consumer queue

pub mod bounded;
pub mod semaphore;

use std::time::Duration;

use minstant::Instant;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl Timeout {
    /// Absolute deadline for this timeout, measured from now.
    ///
    /// Durations too large to represent are treated as infinite.
    pub(crate) fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            Self::Duration(d) => Instant::now().checked_add(d),
        }
    }
}
