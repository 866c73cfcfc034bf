//! Bounded queue throughput and latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin bounded_bench
//!
//! Environment variables:
//!     PRODUCER_CPU=0  Pin producer to CPU 0 (default: 0)
//!     CONSUMER_CPU=2  Pin consumer to CPU 2 (default: 2)

use std::env;
use std::sync::Arc;
use std::sync::Barrier;
use std::time::Instant;

use weir::BoundedQueue;

const QUEUE_SIZE: usize = 1024;
const ITERATIONS: usize = 1 << 20;
const RTT_ITERATIONS: usize = 1 << 16;

type Payload = i32;

fn get_cpu_affinity() -> (Option<usize>, Option<usize>) {
    let producer_cpu = env::var("PRODUCER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(0));
    let consumer_cpu = env::var("CONSUMER_CPU")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(2));
    (producer_cpu, consumer_cpu)
}

fn pin_to_cpu(cpu: Option<usize>) {
    if let Some(id) = cpu {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

fn bench_throughput(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let queue = Arc::new(BoundedQueue::<Payload>::new(QUEUE_SIZE).unwrap());
    let ready = Arc::new(Barrier::new(2));

    let consumer_thread = {
        let queue = Arc::clone(&queue);
        let ready = Arc::clone(&ready);
        std::thread::spawn(move || {
            pin_to_cpu(consumer_cpu);
            ready.wait();

            for expected in 0..ITERATIONS as Payload {
                let value = queue.take().unwrap();
                if value != expected {
                    panic!("Data corruption: expected {}, got {}", expected, value);
                }
            }
        })
    };

    pin_to_cpu(producer_cpu);
    ready.wait();

    let start = Instant::now();

    for i in 0..ITERATIONS as Payload {
        queue.put(i).unwrap();
    }

    consumer_thread.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = ITERATIONS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("{} ops/ms", ops_per_ms);
}

fn bench_rtt(producer_cpu: Option<usize>, consumer_cpu: Option<usize>) {
    let ping = Arc::new(BoundedQueue::<Payload>::new(1).unwrap());
    let pong = Arc::new(BoundedQueue::<Payload>::new(1).unwrap());
    let ready = Arc::new(Barrier::new(2));

    // Responder thread
    let responder = {
        let ping = Arc::clone(&ping);
        let pong = Arc::clone(&pong);
        let ready = Arc::clone(&ready);
        std::thread::spawn(move || {
            pin_to_cpu(consumer_cpu);
            ready.wait();

            for _ in 0..RTT_ITERATIONS {
                let value = ping.take().unwrap();
                pong.put(value).unwrap();
            }
        })
    };

    pin_to_cpu(producer_cpu);
    ready.wait();

    let start = Instant::now();

    for i in 0..RTT_ITERATIONS as Payload {
        ping.put(i).unwrap();
        assert_eq!(pong.take().unwrap(), i);
    }

    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / RTT_ITERATIONS as u128;
    println!("{} ns RTT", rtt_ns);
}

fn main() {
    weir::init_tracing();
    let (producer_cpu, consumer_cpu) = get_cpu_affinity();

    println!(
        "weir BoundedQueue (size={}, iters={}):",
        QUEUE_SIZE, ITERATIONS
    );
    bench_throughput(producer_cpu, consumer_cpu);
    bench_rtt(producer_cpu, consumer_cpu);
}
