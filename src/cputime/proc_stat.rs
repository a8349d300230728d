//! Aggregate text-file backend
//!
//! Fallback sampler that reads the first line of the well-known CPU time
//! text file (`/proc/stat` on Linux). That line carries whitespace-separated
//! tick totals for user, nice, and system time (and often idle and more);
//! the first three summed and converted at the fixed tick rate give the
//! system-wide kernel+user CPU time.

use super::{CpuTimeSource, NS_PER_TICK};
use crate::error::StatsError;
use std::fs;
use std::path::PathBuf;

/// System-wide CPU time from the aggregate first line of a stat file.
#[derive(Debug)]
pub struct ProcStatCpuSource {
    path: PathBuf,
}

impl ProcStatCpuSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CpuTimeSource for ProcStatCpuSource {
    fn absolute_ns(&mut self) -> Result<u64, StatsError> {
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            StatsError::CpuSourceRead(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let first_line = contents.lines().next().ok_or_else(|| {
            StatsError::CpuSourceRead(format!("{} is empty", self.path.display()))
        })?;

        parse_aggregate_line(first_line)
            .map_err(|e| StatsError::CpuSourceRead(format!("{}: {}", self.path.display(), e)))
    }

    fn name(&self) -> &'static str {
        "aggregate-text"
    }
}

/// Parse the aggregate CPU line: a label followed by user, nice, and system
/// tick fields (an idle field and further counters may follow and are
/// ignored). Returns kernel+user time in nanoseconds.
fn parse_aggregate_line(line: &str) -> Result<u64, String> {
    let mut fields = line.split_whitespace();

    match fields.next() {
        Some(label) if label.starts_with("cpu") => {}
        _ => return Err(format!("unexpected aggregate line: {:?}", line)),
    }

    let mut ticks = 0u64;
    for name in ["user", "nice", "system"] {
        let field = fields
            .next()
            .ok_or_else(|| format!("missing {} field in aggregate line", name))?;
        ticks += field
            .parse::<u64>()
            .map_err(|_| format!("malformed {} field {:?}", name, field))?;
    }

    Ok(ticks * NS_PER_TICK)
}
