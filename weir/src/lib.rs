//! Bounded blocking queue for producer/consumer hand-off between threads.
//!
//! The core type is [`BoundedQueue`], a fixed-capacity ring guarded by a
//! mutex, with two counting [`Semaphore`]s tracking empty and filled slots.
//! Producers block while the queue is full, consumers while it is empty, and
//! [`BoundedQueue::close`] releases everyone.
//!
//! - [`sync`] - the queue and its semaphore
//! - [`workload`] - a runnable producer/consumer exercise over the queue
//!
//! Enable the `tracing` feature and call [`init_tracing`] to watch waits and
//! wake-ups.

pub mod error;
mod ring;
pub mod sync;
mod trace;
pub mod workload;

pub use error::{PutError, QueueError};
pub use sync::Timeout;
pub use sync::bounded::{BoundedQueue, Occupancy};
pub use sync::semaphore::{AcquireError, Semaphore};
pub use trace::init_tracing;
