//! Structured snapshot results and output management
//!
//! Every snapshot produces a [`SnapshotResults`] value alongside the logged
//! report, so callers (and tests) can consume the rolled-up numbers without
//! scraping log lines. The [`ResultsManager`] collects snapshots over a run,
//! optionally streams each one into a JSON array as it arrives, and writes a
//! final consolidated document with run metadata for reproducibility.

use crate::flowop::CATEGORY_SLOTS;
use crate::stats::{avg_latency_ms, cpu_us_per_op, mb_per_sec, ops_per_sec, FlowStats};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Report line for one master record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpSummary {
    pub name: String,
    pub ops: u64,
    pub ops_per_sec: f64,
    pub mb_per_sec: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Bucket counts, present only when histogram collection was enabled.
    pub histogram: Option<Vec<u64>>,
}

/// Rolled-up totals for every category slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub all: FlowStats,
    pub sync_io: FlowStats,
    pub async_io: FlowStats,
    pub other: FlowStats,
}

impl CategoryTotals {
    pub(crate) fn from_slots(slots: &[FlowStats]) -> Self {
        debug_assert_eq!(slots.len(), CATEGORY_SLOTS);
        Self {
            all: slots[0],
            sync_io: slots[1],
            async_io: slots[2],
            other: slots[3],
        }
    }
}

/// The one-line I/O summary combining the sync and async categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IoSummary {
    pub total_ops: u64,
    pub ops_per_sec: f64,
    pub reads_per_sec: f64,
    pub writes_per_sec: f64,
    pub mb_per_sec: f64,
    /// Goes negative when the CPU source is degraded; surfaced as-is.
    pub cpu_us_per_op: f64,
    pub avg_latency_ms: f64,
}

impl IoSummary {
    /// Combine the synchronous and asynchronous I/O category totals.
    ///
    /// CPU-per-op divides the run-relative CPU sample over the combined
    /// read+write op count of both categories; the latency average covers
    /// the synchronous category's read+write ops. Both guard the zero-count
    /// case with 0.
    pub fn compute(
        sync_io: &FlowStats,
        async_io: &FlowStats,
        cpu_ns: i64,
        elapsed_secs: f64,
    ) -> Self {
        let total_ops = sync_io.count + async_io.count;
        let rw_ops = sync_io.read_count
            + sync_io.write_count
            + async_io.read_count
            + async_io.write_count;
        let sync_rw_ops = sync_io.read_count + sync_io.write_count;

        Self {
            total_ops,
            ops_per_sec: ops_per_sec(total_ops, elapsed_secs),
            reads_per_sec: ops_per_sec(sync_io.read_count + async_io.read_count, elapsed_secs),
            writes_per_sec: ops_per_sec(sync_io.write_count + async_io.write_count, elapsed_secs),
            mb_per_sec: mb_per_sec(sync_io.bytes + async_io.bytes, elapsed_secs),
            cpu_us_per_op: cpu_us_per_op(cpu_ns, rw_ops),
            avg_latency_ms: avg_latency_ms(sync_io.total_latency_ns, sync_rw_ops),
        }
    }
}

/// Complete structured output of one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResults {
    pub elapsed_secs: f64,
    /// Run-relative CPU time; `-1` when the CPU source was unavailable.
    pub cpu_time_ns: i64,
    pub per_op: Vec<OpSummary>,
    pub categories: CategoryTotals,
    pub io_summary: IoSummary,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Run metadata attached to the final results document.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunMetadata {
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub total_snapshots: usize,
    pub system_info: SystemInfo,
}

/// Host information for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub engine_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            engine_version: crate::VERSION.to_string(),
        }
    }
}

/// Final consolidated results document.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalResults {
    pub metadata: RunMetadata,
    pub snapshots: Vec<SnapshotResults>,
}

/// Collects snapshot results over a run and handles file output.
pub struct ResultsManager {
    output_file: PathBuf,
    streaming_file: Option<PathBuf>,
    results: Vec<SnapshotResults>,
    streaming_enabled: bool,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Result<Self> {
        Ok(Self {
            output_file: output_file.to_path_buf(),
            streaming_file: None,
            results: Vec::new(),
            streaming_enabled: false,
        })
    }

    /// Stream each snapshot into a JSON array as it arrives.
    pub fn enable_streaming<P: AsRef<Path>>(&mut self, streaming_file: P) -> Result<()> {
        let path = streaming_file.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        writeln!(file, "[")?;

        debug!("Enabled streaming to: {:?}", path);
        self.streaming_file = Some(path);
        self.streaming_enabled = true;
        Ok(())
    }

    /// Add one snapshot's results.
    pub fn add_results(&mut self, results: SnapshotResults) -> Result<()> {
        if self.streaming_enabled {
            self.stream_results(&results)?;
        }
        self.results.push(results);
        Ok(())
    }

    fn stream_results(&self, results: &SnapshotResults) -> Result<()> {
        if let Some(ref streaming_file) = self.streaming_file {
            let mut file = OpenOptions::new().append(true).open(streaming_file)?;

            if !self.results.is_empty() {
                writeln!(file, ",")?;
            }
            write!(file, "{}", serde_json::to_string_pretty(results)?)?;
            file.flush()?;
        }
        Ok(())
    }

    /// Close the streaming array and write the consolidated document.
    pub fn finalize(&mut self) -> Result<()> {
        if self.streaming_enabled {
            if let Some(ref streaming_file) = self.streaming_file {
                let mut file = OpenOptions::new().append(true).open(streaming_file)?;
                writeln!(file, "\n]")?;
                file.flush()?;
            }
        }

        let final_results = FinalResults {
            metadata: RunMetadata {
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                total_snapshots: self.results.len(),
                system_info: SystemInfo::default(),
            },
            snapshots: self.results.clone(),
        };
        std::fs::write(
            &self.output_file,
            serde_json::to_string_pretty(&final_results)?,
        )?;

        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> SnapshotResults {
        let zero = FlowStats::new();
        SnapshotResults {
            elapsed_secs: 0.0,
            cpu_time_ns: -1,
            per_op: Vec::new(),
            categories: CategoryTotals::from_slots(&[zero; CATEGORY_SLOTS]),
            io_summary: IoSummary::compute(&zero, &zero, -1, 0.0),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_io_summary_combines_categories() {
        let mut sync_io = FlowStats::new();
        sync_io.count = 60;
        sync_io.read_count = 40;
        sync_io.write_count = 20;
        sync_io.bytes = 6_000_000;
        sync_io.total_latency_ns = 120_000_000;

        let mut async_io = FlowStats::new();
        async_io.count = 40;
        async_io.write_count = 40;
        async_io.bytes = 4_000_000;

        let summary = IoSummary::compute(&sync_io, &async_io, 100_000_000, 10.0);
        assert_eq!(summary.total_ops, 100);
        assert_eq!(summary.ops_per_sec, 10.0);
        assert_eq!(summary.reads_per_sec, 4.0);
        assert_eq!(summary.writes_per_sec, 6.0);
        assert_eq!(summary.mb_per_sec, 1.0);
        // 100ms of CPU over 100 read+write ops.
        assert_eq!(summary.cpu_us_per_op, 1000.0);
        // 120ms over the 60 sync read+write ops.
        assert_eq!(summary.avg_latency_ms, 2.0);
    }

    #[test]
    fn test_io_summary_all_zero_without_faulting() {
        let zero = FlowStats::new();
        let summary = IoSummary::compute(&zero, &zero, -1, 0.0);
        assert_eq!(summary.total_ops, 0);
        assert_eq!(summary.ops_per_sec, 0.0);
        assert_eq!(summary.cpu_us_per_op, 0.0);
        assert_eq!(summary.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_manager_finalize_writes_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("results.json");

        let mut manager = ResultsManager::new(&output).unwrap();
        manager.add_results(empty_snapshot()).unwrap();
        manager.add_results(empty_snapshot()).unwrap();
        manager.finalize().unwrap();

        let contents = std::fs::read_to_string(&output).unwrap();
        let parsed: FinalResults = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.metadata.total_snapshots, 2);
        assert_eq!(parsed.snapshots.len(), 2);
        assert!(parsed.metadata.system_info.cpu_cores > 0);
    }

    #[test]
    fn test_streaming_produces_valid_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("results.json");
        let stream = dir.path().join("stream.json");

        let mut manager = ResultsManager::new(&output).unwrap();
        manager.enable_streaming(&stream).unwrap();
        manager.add_results(empty_snapshot()).unwrap();
        manager.add_results(empty_snapshot()).unwrap();
        manager.finalize().unwrap();

        let contents = std::fs::read_to_string(&stream).unwrap();
        let parsed: Vec<SnapshotResults> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
