//! # Flowbench Statistics Engine
//!
//! The statistics aggregation and reporting core of a benchmark harness that
//! runs many concurrent operation instances across threads. Each instance
//! accumulates its own local counters (op count, bytes, latency); this crate
//! periodically rolls those distributed counters into a consistent
//! point-in-time report while the benchmark keeps running.
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `stats`: the flow statistics record and its associative merge algebra
//! - `flowop`: operation instances, categories, and the workload registry
//! - `cputime`: platform-abstracted CPU time sampling with graceful
//!   degradation
//! - `snapshot`: run lifecycle (`clear`) and snapshot generation with report
//!   emission
//! - `results`: structured snapshot results and JSON output management
//! - `cli` / `logging`: configuration and log formatting for the synthetic
//!   workload driver binary
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use flowbench::{Category, FlowOp, InstanceKind, OpKind, StatsCollector, Workload};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut workload = Workload::new();
//!     workload.register(FlowOp::new("seq-read", 0, InstanceKind::Master, Category::SyncIo));
//!     let worker = workload.register(FlowOp::new(
//!         "seq-read",
//!         1,
//!         InstanceKind::Runtime,
//!         Category::SyncIo,
//!     ));
//!
//!     let mut stats = StatsCollector::new(flowbench::cputime::probe());
//!     stats.clear(&workload)?;
//!
//!     worker.record(OpKind::Read, 4096, 1_500_000, false);
//!
//!     let results = stats.snapshot(&workload)?;
//!     println!("{} ops", results.io_summary.total_ops);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! Each runtime instance exclusively mutates its own record behind a
//! per-record mutex held only for single updates; the snapshot engine copies
//! one record at a time under that lock. No lock spans the rollup traversal,
//! so report generation never pauses the whole run. Everything in the core
//! is synchronous and runs to completion.

pub mod cli;
pub mod cputime;
pub mod error;
pub mod flowop;
pub mod logging;
pub mod results;
pub mod snapshot;
pub mod stats;

// Re-export the primary types for convenient library usage.

pub use cputime::{CpuTimeSource, CounterCpuSource, ProcStatCpuSource, UnavailableCpuSource};
pub use error::StatsError;
pub use flowop::{Category, FlowOp, InstanceKind, Workload};
pub use results::{ResultsManager, SnapshotResults};
pub use snapshot::StatsCollector;
pub use stats::{FlowStats, LatencyHistogram, OpKind};

/// The current version of the statistics engine
///
/// Populated from Cargo.toml and embedded in result output for
/// reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values for the workload driver.
pub mod defaults {
    /// Default number of concurrent worker threads.
    pub const WORKERS: usize = 4;

    /// Default I/O size attributed to each synthetic operation.
    ///
    /// 4KB matches the most common filesystem block size, so the MB/s
    /// figures in the report resemble a real small-block workload.
    pub const IO_SIZE: u64 = 4096;

    /// Default output file name.
    pub const OUTPUT_FILE: &str = "flowbench_results.json";
}
