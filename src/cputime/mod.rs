//! Platform-abstracted CPU time sampling
//!
//! The snapshot engine reports CPU consumed per operation, which requires a
//! system-wide CPU time sample at run start (the baseline) and at each
//! snapshot. Platforms expose that number in different ways, so the sampler
//! is a trait with three backends:
//!
//! - [`CounterCpuSource`]: enumerates one counter handle per CPU from the OS
//!   counter listing and sums kernel+user time across all of them, rebuilding
//!   its CPU list when the topology changes.
//! - [`ProcStatCpuSource`]: parses the aggregate first line of the
//!   well-known `/proc/stat` text file.
//! - [`UnavailableCpuSource`]: always fails; the engine degrades to a
//!   sentinel and the report carries visibly invalid CPU figures instead of
//!   silently zeroed ones.
//!
//! The backend is chosen once at process start by [`probe`] and injected
//! into the collector as a `Box<dyn CpuTimeSource>`; nothing is selected at
//! build time.

use crate::error::StatsError;
use tracing::{debug, info, warn};

mod counters;
mod proc_stat;

pub use counters::CounterCpuSource;
pub use proc_stat::ProcStatCpuSource;

/// Well-known text file carrying system-wide CPU time on Linux.
pub const PROC_STAT_PATH: &str = "/proc/stat";

/// Nanoseconds per platform tick (100 Hz jiffies).
pub const NS_PER_TICK: u64 = 10_000_000;

/// Sentinel for a relative CPU sample that could not be taken.
pub const CPU_TIME_UNAVAILABLE: i64 = -1;

/// Absolute system-wide CPU time sampler.
///
/// `absolute_ns` returns the total kernel+user CPU time consumed across all
/// CPUs since boot, in nanoseconds. Samplers may cache handles between
/// calls, hence `&mut self`.
pub trait CpuTimeSource: Send {
    fn absolute_ns(&mut self) -> Result<u64, StatsError>;

    /// Short backend label for logging.
    fn name(&self) -> &'static str;
}

/// Backend that fails every sample.
///
/// Logs a single warning on first use so a degraded run is visible without
/// flooding the log once per snapshot.
#[derive(Debug, Default)]
pub struct UnavailableCpuSource {
    warned: bool,
}

impl UnavailableCpuSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CpuTimeSource for UnavailableCpuSource {
    fn absolute_ns(&mut self) -> Result<u64, StatsError> {
        if !self.warned {
            warn!("No usable source of system CPU time; CPU figures in reports will be invalid");
            self.warned = true;
        }
        Err(StatsError::CpuSourceUnavailable(
            "no platform backend".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Probe the platform once at process start and pick a backend.
///
/// Prefers per-CPU counter enumeration, falls back to the aggregate text
/// line, and finally to the unavailable backend. Selection is by runtime
/// probing (can the subsystem be opened and read?), never by build
/// configuration.
pub fn probe() -> Box<dyn CpuTimeSource> {
    match CounterCpuSource::new(PROC_STAT_PATH) {
        Ok(source) => {
            info!("CPU time source: per-cpu counters ({} cpus)", source.cpu_count());
            if source.cpu_count() != num_cpus::get() {
                // Offline CPUs have no counter row; the sampler tracks the
                // listing, not the nominal core count.
                debug!(
                    "counter listing shows {} cpus, platform reports {}",
                    source.cpu_count(),
                    num_cpus::get()
                );
            }
            return Box::new(source);
        }
        Err(e) => debug!("per-cpu counter backend unavailable: {}", e),
    }

    let mut aggregate = ProcStatCpuSource::new(PROC_STAT_PATH);
    match aggregate.absolute_ns() {
        Ok(_) => {
            info!("CPU time source: aggregate {} line", PROC_STAT_PATH);
            Box::new(aggregate)
        }
        Err(e) => {
            debug!("aggregate text backend unavailable: {}", e);
            Box::new(UnavailableCpuSource::new())
        }
    }
}
