//! Producer/consumer exercise over a bounded queue.
//!
//! Spawns producer and consumer threads sharing one queue, then reports how
//! many items moved and whether every item came out exactly once.
//!
//! # Usage
//!
//! ```sh
//! prodcon --producers 4 --consumers 2 --items 10000 --capacity 8
//! ```
//!
//! Flags fall back to `WEIR_PRODUCERS`, `WEIR_CONSUMERS`, `WEIR_ITEMS` and
//! `WEIR_CAPACITY`, then to built-in defaults.

use std::env;

use thiserror::Error;
use weir::workload::{self, WorkloadConfig, WorkloadError};

#[derive(Debug, Error)]
enum CliError {
    #[error("missing value for {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue { flag: &'static str, value: String },
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error(transparent)]
    Workload(#[from] WorkloadError),
    #[error("{consumed} of {produced} items consumed, but not each exactly once")]
    Mismatch { produced: usize, consumed: usize },
}

fn main() {
    weir::init_tracing();

    if let Err(e) = run() {
        eprintln!("prodcon: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let args: Vec<String> = env::args().collect();
    let config = parse_args(&args, |var| env::var(var).ok())?;

    eprintln!(
        "prodcon: {} producer(s) x {} item(s), {} consumer(s), capacity {}",
        config.producers, config.items_per_producer, config.consumers, config.capacity
    );

    let report = workload::run(&config)?;

    println!("produced:     {}", report.produced);
    println!("consumed:     {}", report.consumed);
    println!("per consumer: {:?}", report.per_consumer);
    println!("elapsed:      {:?}", report.elapsed);

    if !report.intact {
        return Err(CliError::Mismatch {
            produced: report.produced,
            consumed: report.consumed,
        });
    }
    println!("intact:       yes");
    Ok(())
}

/// Builds the config from flags, falling back to env vars, then defaults.
///
/// An env var is only read for a setting no flag supplied, so a malformed
/// variable cannot break an otherwise valid command line.
fn parse_args<E>(args: &[String], lookup_env: E) -> Result<WorkloadConfig, CliError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut producers = None;
    let mut consumers = None;
    let mut items = None;
    let mut capacity = None;

    let mut i = 1;
    while i < args.len() {
        let flag = match args[i].as_str() {
            "--producers" | "-p" => "--producers",
            "--consumers" | "-c" => "--consumers",
            "--items" | "-n" => "--items",
            "--capacity" | "-k" => "--capacity",
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            arg => return Err(CliError::UnknownArgument(arg.to_string())),
        };

        i += 1;
        let value = args.get(i).ok_or(CliError::MissingValue(flag))?;
        let parsed = Some(parse_count(flag, value)?);
        match flag {
            "--producers" => producers = parsed,
            "--consumers" => consumers = parsed,
            "--items" => items = parsed,
            _ => capacity = parsed,
        }
        i += 1;
    }

    let defaults = WorkloadConfig::default();
    Ok(WorkloadConfig {
        producers: resolve(producers, "WEIR_PRODUCERS", defaults.producers, &lookup_env)?,
        consumers: resolve(consumers, "WEIR_CONSUMERS", defaults.consumers, &lookup_env)?,
        items_per_producer: resolve(
            items,
            "WEIR_ITEMS",
            defaults.items_per_producer,
            &lookup_env,
        )?,
        capacity: resolve(capacity, "WEIR_CAPACITY", defaults.capacity, &lookup_env)?,
    })
}

fn resolve<E>(
    flag: Option<usize>,
    var: &'static str,
    default: usize,
    lookup_env: &E,
) -> Result<usize, CliError>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(value) = flag {
        return Ok(value);
    }
    match lookup_env(var) {
        Some(value) => parse_count(var, &value),
        None => Ok(default),
    }
}

fn parse_count(flag: &'static str, value: &str) -> Result<usize, CliError> {
    value.trim().parse().map_err(|_| CliError::InvalidValue {
        flag,
        value: value.to_string(),
    })
}

fn print_usage() {
    eprintln!(
        r#"prodcon - bounded queue producer/consumer exercise

USAGE:
    prodcon [OPTIONS]

OPTIONS:
    -p, --producers <N>   Producer threads (default: 2, env: WEIR_PRODUCERS)
    -c, --consumers <N>   Consumer threads (default: 2, env: WEIR_CONSUMERS)
    -n, --items <N>       Items per producer (default: 1000, env: WEIR_ITEMS)
    -k, --capacity <N>    Queue capacity (default: 16, env: WEIR_CAPACITY)
    -h, --help            Print this help message

EXAMPLE:
    prodcon --producers 4 --consumers 2 --items 10000 --capacity 8
    RUST_LOG=weir=debug prodcon    (with --features tracing)
"#
    );
}
