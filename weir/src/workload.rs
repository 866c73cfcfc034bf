//! Producer/consumer workload over a shared [`BoundedQueue`].
//!
//! Spawns `producers` threads that each put `items_per_producer` distinct
//! values and `consumers` threads that take until every value is accounted
//! for, then checks that what came out is exactly what went in.
//!
//! Consumers claim a ticket before each take, so together they take exactly
//! `producers * items_per_producer` items and no consumer is left blocked
//! once the last item is delivered. If a producer dies, the queue is closed
//! so the consumers waiting on its items wake up with
//! [`QueueError::Closed`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use crate::error::QueueError;
use crate::sync::bounded::BoundedQueue;
use crate::trace::{debug, error, info, warn};

/// Default number of producer threads.
pub const DEFAULT_PRODUCERS: usize = 2;

/// Default number of consumer threads.
pub const DEFAULT_CONSUMERS: usize = 2;

/// Default number of items each producer puts.
pub const DEFAULT_ITEMS_PER_PRODUCER: usize = 1000;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 16;

/// Shape of a workload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: usize,
    pub capacity: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            producers: DEFAULT_PRODUCERS,
            consumers: DEFAULT_CONSUMERS,
            items_per_producer: DEFAULT_ITEMS_PER_PRODUCER,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl WorkloadConfig {
    /// Checks that the run can make progress.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError::InvalidConfig`] if there are no producers or
    /// no consumers, or if the item total overflows.
    pub fn validate(&self) -> Result<(), WorkloadError> {
        if self.producers == 0 {
            return Err(WorkloadError::InvalidConfig("need at least one producer"));
        }
        if self.consumers == 0 {
            return Err(WorkloadError::InvalidConfig("need at least one consumer"));
        }
        if self.total_items().is_none() {
            return Err(WorkloadError::InvalidConfig("item total overflows"));
        }
        // Capacity is left to the queue, which reports its own error.
        Ok(())
    }

    /// Total number of items the producers put, or `None` if it does not
    /// fit in a `usize`.
    #[must_use]
    pub const fn total_items(&self) -> Option<usize> {
        self.producers.checked_mul(self.items_per_producer)
    }
}

/// Errors from a workload run.
#[derive(Debug, Error)]
pub enum WorkloadError {
    /// The configuration cannot run to completion.
    #[error("invalid workload: {0}")]
    InvalidConfig(&'static str),
    /// The queue rejected construction or an operation.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    /// A worker thread could not be started.
    #[error("failed to spawn thread: {0}")]
    Spawn(std::io::Error),
    /// A worker thread panicked.
    #[error("worker thread `{0}` panicked")]
    WorkerPanicked(String),
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadReport {
    /// Items successfully put.
    pub produced: usize,
    /// Items successfully taken.
    pub consumed: usize,
    /// How many items each consumer took, by consumer index.
    pub per_consumer: Vec<usize>,
    /// Wall time from first spawn to last join.
    pub elapsed: Duration,
    /// `true` if the consumed items are exactly the produced items, each once.
    pub intact: bool,
}

type Worker<R> = JoinHandle<Result<R, QueueError>>;

/// Runs `config` to completion.
///
/// # Errors
///
/// - [`WorkloadError::InvalidConfig`] if `config` fails validation
/// - [`WorkloadError::Queue`] if the queue cannot be built or a producer is
///   cut off by a closed queue
/// - [`WorkloadError::Spawn`] / [`WorkloadError::WorkerPanicked`] for thread
///   failures
pub fn run(config: &WorkloadConfig) -> Result<WorkloadReport, WorkloadError> {
    config.validate()?;
    let total = config
        .total_items()
        .ok_or(WorkloadError::InvalidConfig("item total overflows"))?;

    let queue = Arc::new(BoundedQueue::<u64>::new(config.capacity)?);
    let tickets = Arc::new(AtomicUsize::new(total));

    info!(
        producers = config.producers,
        consumers = config.consumers,
        items = total,
        capacity = config.capacity,
        "workload starting"
    );
    let start = Instant::now();

    let mut producers: Vec<Worker<usize>> = Vec::with_capacity(config.producers);
    for p in 0..config.producers {
        let spawned = spawn_producer(p, config.items_per_producer, Arc::clone(&queue));
        match spawned {
            Ok(handle) => producers.push(handle),
            Err(err) => {
                queue.close();
                return Err(err);
            }
        }
    }

    let mut consumers: Vec<Worker<Vec<u64>>> = Vec::with_capacity(config.consumers);
    for c in 0..config.consumers {
        let spawned = spawn_consumer(c, Arc::clone(&tickets), Arc::clone(&queue));
        match spawned {
            Ok(handle) => consumers.push(handle),
            Err(err) => {
                queue.close();
                return Err(err);
            }
        }
    }

    let mut produced = 0;
    let mut failure = None;
    for handle in producers {
        match join(handle) {
            Ok(Ok(n)) => produced += n,
            Ok(Err(err)) => {
                failure.get_or_insert(WorkloadError::Queue(err));
            }
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    if failure.is_some() {
        // Consumers may be waiting on items that will never arrive.
        warn!("producer failed, closing queue");
        queue.close();
    }

    let mut consumed_items = Vec::with_capacity(total);
    let mut per_consumer = Vec::with_capacity(config.consumers);
    for handle in consumers {
        match join(handle) {
            Ok(Ok(items)) => {
                per_consumer.push(items.len());
                consumed_items.extend(items);
            }
            Ok(Err(err)) => {
                per_consumer.push(0);
                failure.get_or_insert(WorkloadError::Queue(err));
            }
            Err(err) => {
                per_consumer.push(0);
                failure.get_or_insert(err);
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    let elapsed = start.elapsed();
    let consumed = consumed_items.len();
    let intact = is_exact_cover(consumed_items, total);
    if !intact {
        error!(produced, consumed, "consumed items differ from produced items");
    }
    info!(produced, consumed, ?elapsed, intact, "workload finished");

    Ok(WorkloadReport {
        produced,
        consumed,
        per_consumer,
        elapsed,
        intact,
    })
}

/// Value put by producer `p` for its `i`-th item. Distinct across producers.
const fn item_value(p: usize, i: usize, items_per_producer: usize) -> u64 {
    (p * items_per_producer + i) as u64
}

fn spawn_producer(
    p: usize,
    items: usize,
    queue: Arc<BoundedQueue<u64>>,
) -> Result<Worker<usize>, WorkloadError> {
    thread::Builder::new()
        .name(format!("producer-{p}"))
        .spawn(move || {
            for i in 0..items {
                queue.put(item_value(p, i, items))?;
            }
            debug!(producer = p, items, "producer done");
            Ok(items)
        })
        .map_err(WorkloadError::Spawn)
}

fn spawn_consumer(
    c: usize,
    tickets: Arc<AtomicUsize>,
    queue: Arc<BoundedQueue<u64>>,
) -> Result<Worker<Vec<u64>>, WorkloadError> {
    thread::Builder::new()
        .name(format!("consumer-{c}"))
        .spawn(move || {
            let mut taken = Vec::new();
            while claim(&tickets) {
                match queue.take() {
                    Ok(item) => taken.push(item),
                    // Closed because a producer failed; report what we have.
                    Err(QueueError::Closed) => break,
                    Err(err) => return Err(err),
                }
            }
            debug!(consumer = c, items = taken.len(), "consumer done");
            Ok(taken)
        })
        .map_err(WorkloadError::Spawn)
}

/// Claims one of the remaining items. Returns `false` once none are left.
fn claim(tickets: &AtomicUsize) -> bool {
    tickets
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

fn join<R>(handle: Worker<R>) -> Result<Result<R, QueueError>, WorkloadError> {
    let name = handle.thread().name().unwrap_or("worker").to_string();
    handle.join().map_err(|_| WorkloadError::WorkerPanicked(name))
}

/// `true` if `items` holds each of `0..total` exactly once.
fn is_exact_cover(mut items: Vec<u64>, total: usize) -> bool {
    if items.len() != total {
        return false;
    }
    items.sort_unstable();
    items.iter().zip(0u64..).all(|(&item, expected)| item == expected)
}
