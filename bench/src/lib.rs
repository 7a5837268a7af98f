//! Couchbase Cluster Scaling Benchmark Library
//!
//! Drives a Couchbase cluster through a sweep of durability levels, cluster
//! sizes and data set sizes, and records how long individual operations take.
//!
//! ## Architecture
//!
//! - `types`: configuration, parameters, reports and the error type
//! - `operations`: timed database operations and latency recording
//! - `documents`: random test documents
//! - `sweep`: the sweep driver and the latency workloads
//! - `latency`: the latency output tree and its summaries
//! - `ycsb`: YCSB workloads over the sweep or a fixed-topology grid
//! - `commands`: command implementations used by the `bench` binary
//! - `utils`: statistics and file helpers

pub mod cli;
pub mod commands;
pub mod documents;
pub mod latency;
pub mod operations;
pub mod sweep;
pub mod types;
pub mod utils;
pub mod ycsb;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub use sweep::{BenchmarkSweepDriver, LatencyExecutor, StepContext, WorkloadExecutor};
pub use types::{
    BenchmarkError, BenchmarkParameters, BenchmarkResult, BucketSize, LatencyResults,
    LatencySummary, SweepConfig, SweepReport,
};

/// Initialize logging for the benchmark application
///
/// Logs at info level, or debug when `verbose` is set. `RUST_LOG` still
/// applies on top.
pub fn init_logging(verbose: bool) -> BenchmarkResult<()> {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .map_err(|e| {
            BenchmarkError::Initialization(format!("Failed to initialize logging: {e}"))
        })?;

    Ok(())
}

/// Stop flag set by Ctrl-C; sweeps check it between combinations
pub fn install_stop_flag() -> BenchmarkResult<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);

    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current workload");
        handler_flag.store(true, Ordering::SeqCst);
    })
    .map_err(|e| BenchmarkError::Initialization(format!("Failed to set Ctrl-C handler: {e}")))?;

    Ok(stop)
}
