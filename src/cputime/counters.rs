//! Per-CPU counter backend
//!
//! Enumerates one counter handle per CPU from the OS counter listing (the
//! `cpuN` rows of the counter file) and sums kernel+user time across all of
//! them. The handle list is cached between samples and rebuilt whenever the
//! enumerated topology no longer matches the cached one, so CPU hotplug
//! during a long run does not wedge the sampler.

use super::{CpuTimeSource, NS_PER_TICK};
use crate::error::StatsError;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// System-wide CPU time from per-CPU counter rows.
#[derive(Debug)]
pub struct CounterCpuSource {
    path: PathBuf,
    /// Cached counter handle labels ("cpu0", "cpu1", ...).
    cpus: Vec<String>,
}

/// One enumerated counter row: handle label and its kernel+user ticks.
struct CounterRow {
    label: String,
    ticks: u64,
}

impl CounterCpuSource {
    /// Open the counter subsystem and build the initial CPU list.
    ///
    /// Fails with `CpuSourceUnavailable` when the subsystem cannot be opened
    /// or enumerates zero CPUs.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StatsError> {
        let mut source = Self {
            path: path.into(),
            cpus: Vec::new(),
        };
        let rows = source.enumerate()?;
        source.rebuild(&rows)?;
        Ok(source)
    }

    /// Number of CPUs in the cached counter list.
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// Read the counter listing and collect every per-CPU row.
    fn enumerate(&self) -> Result<Vec<CounterRow>, StatsError> {
        let listing = fs::read_to_string(&self.path).map_err(|e| {
            StatsError::CpuSourceUnavailable(format!(
                "cannot open counter subsystem {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let mut rows = Vec::new();
        for line in listing.lines() {
            if let Some(row) = parse_counter_row(line)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Replace the cached CPU list with the freshly enumerated one.
    fn rebuild(&mut self, rows: &[CounterRow]) -> Result<(), StatsError> {
        if rows.is_empty() {
            return Err(StatsError::CpuSourceUnavailable(format!(
                "no per-cpu counters found in {}",
                self.path.display()
            )));
        }
        self.cpus = rows.iter().map(|r| r.label.clone()).collect();
        Ok(())
    }

    fn topology_changed(&self, rows: &[CounterRow]) -> bool {
        rows.len() != self.cpus.len()
            || rows.iter().zip(self.cpus.iter()).any(|(r, c)| r.label != *c)
    }
}

impl CpuTimeSource for CounterCpuSource {
    fn absolute_ns(&mut self) -> Result<u64, StatsError> {
        let rows = self.enumerate()?;

        if self.cpus.is_empty() || self.topology_changed(&rows) {
            debug!(
                "cpu topology changed ({} -> {} cpus), rebuilding counter list",
                self.cpus.len(),
                rows.len()
            );
            self.rebuild(&rows)?;
        }

        let ticks: u64 = rows.iter().map(|r| r.ticks).sum();
        Ok(ticks * NS_PER_TICK)
    }

    fn name(&self) -> &'static str {
        "per-cpu-counters"
    }
}

/// Parse one listing line into a per-CPU counter row, if it is one.
///
/// Only rows labeled `cpu<N>` are counter handles; the aggregate `cpu` row
/// and unrelated rows yield `None`. A handle row carries at least three tick
/// fields (user, nice, system); the sum of those three is the row's
/// kernel+user time.
fn parse_counter_row(line: &str) -> Result<Option<CounterRow>, StatsError> {
    let mut fields = line.split_whitespace();
    let label = match fields.next() {
        Some(l) if is_cpu_handle(l) => l,
        _ => return Ok(None),
    };

    let mut ticks = 0u64;
    for _ in 0..3 {
        let field = fields.next().ok_or_else(|| {
            StatsError::CpuSourceUnavailable(format!("truncated counter row for {}", label))
        })?;
        ticks += field.parse::<u64>().map_err(|_| {
            StatsError::CpuSourceUnavailable(format!("malformed counter row for {}", label))
        })?;
    }

    Ok(Some(CounterRow {
        label: label.to_string(),
        ticks,
    }))
}

fn is_cpu_handle(label: &str) -> bool {
    label
        .strip_prefix("cpu")
        .map_or(false, |rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TWO_CPU_LISTING: &str = "\
cpu  1636 67 1392 208671 5407 20 12
cpu0 626 8 997 104476 2499 7 7
cpu1 1010 58 395 104195 2907 13 5
intr 114930548 113199788 3 0
ctxt 23049029
";

    fn listing_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_sums_kernel_and_user_across_cpus() {
        let file = listing_file(TWO_CPU_LISTING);
        let mut source = CounterCpuSource::new(file.path()).unwrap();
        assert_eq!(source.cpu_count(), 2);

        // (626+8+997) + (1010+58+395) ticks, 10ms each.
        let expected_ticks = 1631 + 1463;
        assert_eq!(source.absolute_ns().unwrap(), expected_ticks * NS_PER_TICK);
    }

    #[test]
    fn test_rebuilds_on_topology_change() {
        let mut file = listing_file(TWO_CPU_LISTING);
        let mut source = CounterCpuSource::new(file.path()).unwrap();
        assert_eq!(source.cpu_count(), 2);

        // A third CPU comes online.
        file.as_file_mut().set_len(0).unwrap();
        use std::io::Seek;
        file.as_file_mut().rewind().unwrap();
        file.write_all(
            b"cpu  3000 0 3000 0\ncpu0 500 0 500 0\ncpu1 500 0 500 0\ncpu2 500 0 500 0\n",
        )
        .unwrap();
        file.flush().unwrap();

        assert_eq!(source.absolute_ns().unwrap(), 3000 * NS_PER_TICK);
        assert_eq!(source.cpu_count(), 3);
    }

    #[test]
    fn test_zero_cpus_is_unavailable() {
        let file = listing_file("intr 12345\nctxt 6789\n");
        let err = CounterCpuSource::new(file.path()).unwrap_err();
        assert!(matches!(err, StatsError::CpuSourceUnavailable(_)));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = CounterCpuSource::new("/nonexistent/counter/listing").unwrap_err();
        assert!(matches!(err, StatsError::CpuSourceUnavailable(_)));
    }

    #[test]
    fn test_aggregate_row_is_not_a_handle() {
        assert!(!is_cpu_handle("cpu"));
        assert!(is_cpu_handle("cpu0"));
        assert!(is_cpu_handle("cpu12"));
        assert!(!is_cpu_handle("cpufreq"));
        assert!(!is_cpu_handle("intr"));
    }

    #[test]
    fn test_truncated_row_rejected() {
        assert!(parse_counter_row("cpu0 100 200").is_err());
        assert!(parse_counter_row("cpu0 100 abc 300").is_err());
    }
}
