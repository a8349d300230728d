//! Error types for the statistics engine
//!
//! The core distinguishes ordering errors (snapshot before clear, aborted
//! runs), CPU-source degradation, and allocation failure. CPU-source errors
//! never abort a run; the sampler degrades to a sentinel value and the report
//! is still produced. Ordering errors abort only the reporting step.

use thiserror::Error;

/// Errors produced by the statistics engine.
#[derive(Debug, Error)]
pub enum StatsError {
    /// `snapshot()` was called before any `clear()` established a baseline.
    #[error("stats snapshot requested before stats clear")]
    NoBaseline,

    /// The run was flagged as aborted; accumulated statistics are not valid.
    #[error("no valid results: run terminated prematurely")]
    RunAborted,

    /// No usable CPU time source exists on this platform (or the counter
    /// subsystem enumerated zero CPUs).
    #[error("cpu time source unavailable: {0}")]
    CpuSourceUnavailable(String),

    /// The CPU time source exists but a sample could not be read or parsed.
    #[error("failed to read cpu time source: {0}")]
    CpuSourceRead(String),

    /// The global category table could not be allocated.
    #[error("failed to allocate statistics table: {0}")]
    Allocation(#[from] std::collections::TryReserveError),
}
