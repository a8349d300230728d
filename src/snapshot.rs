//! Run lifecycle and snapshot generation
//!
//! The [`StatsCollector`] is the context object for one benchmark run. It
//! owns the global category table (one [`FlowStats`] slot per category plus
//! the all-categories slot), the CPU baseline, and the injected CPU time
//! source. It is constructed at run start and passed into every lifecycle
//! operation; nothing here is process-global.
//!
//! Lifecycle: `new()` captures the CPU baseline once; `clear()` allocates
//! the table on first use, zeroes all live records, and stamps a new start
//! time; `snapshot()` rolls every runtime instance into the category totals
//! and its master record, then renders and logs the report. Snapshots are
//! re-entrant and cumulative: each one reports totals since the last
//! `clear()`, not since the previous snapshot.
//!
//! Consistency during rollup is per-record: a runtime instance's record is
//! copied out under its own mutex, which the owner holds only for single
//! counter updates. A snapshot is therefore internally consistent at record
//! granularity without ever pausing the whole run.

use crate::cputime::{CpuTimeSource, CPU_TIME_UNAVAILABLE};
use crate::error::StatsError;
use crate::flowop::{Category, InstanceKind, Workload, CATEGORY_SLOTS};
use crate::results::{CategoryTotals, IoSummary, OpSummary, SnapshotResults};
use crate::stats::{avg_latency_ms, hrtime_ns, mb_per_sec, ops_per_sec, FlowStats};
use tracing::{debug, error, info, trace, warn};

/// Per-run statistics context: category table, CPU baseline, CPU sampler.
pub struct StatsCollector {
    cpu: Box<dyn CpuTimeSource>,
    /// Absolute CPU time at run start; `None` when the sample failed.
    baseline_ns: Option<u64>,
    /// Global category table, allocated lazily on the first `clear()`.
    table: Option<Vec<FlowStats>>,
}

impl StatsCollector {
    /// Construct the run context and capture the CPU baseline exactly once.
    pub fn new(cpu: Box<dyn CpuTimeSource>) -> Self {
        let mut collector = Self {
            cpu,
            baseline_ns: None,
            table: None,
        };
        collector.baseline_ns = collector.sample_cpu();
        collector
    }

    fn sample_cpu(&mut self) -> Option<u64> {
        match self.cpu.absolute_ns() {
            Ok(ns) => Some(ns),
            Err(e) => {
                warn!("CPU time sample failed ({}): {}", self.cpu.name(), e);
                None
            }
        }
    }

    /// CPU time consumed since the baseline, or the sentinel when either
    /// the baseline or the current sample failed. Degraded samples flow
    /// into the report as visibly nonsensical figures, never as zero.
    pub fn relative_cpu_ns(&mut self) -> i64 {
        let sample = self.sample_cpu();
        match (self.baseline_ns, sample) {
            (Some(baseline), Some(now)) => now as i64 - baseline as i64,
            _ => CPU_TIME_UNAVAILABLE,
        }
    }

    /// Reset statistics for a new measurement phase.
    ///
    /// Resamples the CPU baseline, allocates the category table on the
    /// first invocation only, zeroes every table slot and every live
    /// instance's record (restoring the min-latency sentinel), and stamps a
    /// new start time. Safe to call repeatedly between phases, e.g. after
    /// warmup.
    pub fn clear(&mut self, workload: &Workload) -> Result<(), StatsError> {
        self.baseline_ns = self.sample_cpu();

        if self.table.is_none() {
            let mut table = Vec::new();
            table.try_reserve_exact(CATEGORY_SLOTS)?;
            table.resize(CATEGORY_SLOTS, FlowStats::new());
            self.table = Some(table);
        }
        if let Some(table) = self.table.as_mut() {
            for slot in table.iter_mut() {
                slot.reset();
            }
            table[0].start_ns = hrtime_ns();
        }

        for op in workload.iter() {
            debug!("Clearing stats for {}-{}", op.name(), op.instance());
            op.reset_stats();
        }

        Ok(())
    }

    /// Roll up all runtime instances and emit the report.
    ///
    /// Returns the structured results; the rendered per-operation breakdown
    /// and the I/O summary line are emitted through the logging interface.
    /// Calling this before `clear()` is an ordering error; an aborted run
    /// produces no report at all.
    pub fn snapshot(&mut self, workload: &Workload) -> Result<SnapshotResults, StatsError> {
        if workload.is_aborted() {
            error!("NO VALID RESULTS! Run terminated prematurely");
            return Err(StatsError::RunAborted);
        }
        if self.table.is_none() {
            error!("stats snapshot requested before stats clear");
            return Err(StatsError::NoBaseline);
        }

        let elapsed_secs = {
            let table = self.table.as_mut().ok_or(StatsError::NoBaseline)?;

            // Blank the table for this summation pass. The collection start
            // time must survive: a snapshot is measured against the
            // original start, not against the previous snapshot.
            let start_ns = table[0].start_ns;
            for slot in table.iter_mut() {
                slot.reset();
            }
            table[0].start_ns = start_ns;
            table[0].end_ns = hrtime_ns();

            let elapsed_secs = (table[0].end_ns - table[0].start_ns) as f64 / 1e9;
            debug!("Stats period = {:.0} sec", elapsed_secs);

            // Masters restart from blank too; their totals are re-derived
            // from the runtime records on every snapshot.
            for op in workload.iter() {
                if op.kind() == InstanceKind::Master {
                    op.reset_stats();
                }
            }

            for op in workload.iter() {
                if op.kind() != InstanceKind::Runtime {
                    continue;
                }

                // Narrow consistency window: the record is copied out under
                // its own lock, then merged lock-free.
                let record = op.stats();

                table[op.category().slot()].merge(&record);
                table[0].merge(&record);

                match workload.find_master(op.name()) {
                    Some(master) => master.merge_stats(&record),
                    None => trace!("no master record found for flowop {}", op.name()),
                }

                debug!(
                    "flowop {:<20}-{:<4} - {:5} ops {:5.1} ops/sec {:5.1}mb/s {:8.3}ms/op",
                    op.name(),
                    op.instance(),
                    record.count,
                    ops_per_sec(record.count, elapsed_secs),
                    mb_per_sec(record.bytes, elapsed_secs),
                    avg_latency_ms(record.total_latency_ns, record.count),
                );
            }

            elapsed_secs
        };

        let cpu_time_ns = self.relative_cpu_ns();
        let table = self.table.as_ref().ok_or(StatsError::NoBaseline)?;

        // Per-operation breakdown: one line per master, appended to a
        // growable report emitted once through the log.
        let mut report = String::from("Per-Operation Breakdown\n");
        let mut per_op = Vec::new();

        for op in workload.iter() {
            if op.kind() != InstanceKind::Master {
                continue;
            }
            let stats = op.stats();

            let summary = OpSummary {
                name: op.name().to_string(),
                ops: stats.count,
                ops_per_sec: ops_per_sec(stats.count, elapsed_secs),
                mb_per_sec: mb_per_sec(stats.bytes, elapsed_secs),
                avg_latency_ms: avg_latency_ms(stats.total_latency_ns, stats.count),
                min_latency_ms: stats.min_latency_ms(),
                max_latency_ms: stats.max_latency_ms(),
                histogram: if workload.histogram_enabled() {
                    Some(stats.histogram.buckets().to_vec())
                } else {
                    None
                },
            };

            report.push_str(&format!(
                "{:<20} {}ops {:8.0}ops/s {:5.1}mb/s {:8.1}ms/op [{:.2}ms - {:5.2}ms]",
                summary.name,
                summary.ops,
                summary.ops_per_sec,
                summary.mb_per_sec,
                summary.avg_latency_ms,
                summary.min_latency_ms,
                summary.max_latency_ms,
            ));
            if let Some(ref buckets) = summary.histogram {
                report.push_str("\t[ ");
                for bucket in buckets {
                    report.push_str(&format!("{} ", bucket));
                }
                report.push(']');
            }
            report.push('\n');

            per_op.push(summary);
        }

        // Drop the trailing newline before emitting.
        report.pop();
        info!("{}", report);

        let io_summary = IoSummary::compute(
            &table[Category::SyncIo.slot()],
            &table[Category::AsyncIo.slot()],
            cpu_time_ns,
            elapsed_secs,
        );
        info!(
            "IO Summary: {:5} ops, {:5.3} ops/s, {:.0}/{:.0} rd/wr, {:5.1}mb/s, {:6.0}us cpu/op, {:5.1}ms latency",
            io_summary.total_ops,
            io_summary.ops_per_sec,
            io_summary.reads_per_sec,
            io_summary.writes_per_sec,
            io_summary.mb_per_sec,
            io_summary.cpu_us_per_op,
            io_summary.avg_latency_ms,
        );

        Ok(SnapshotResults {
            elapsed_secs,
            cpu_time_ns,
            per_op,
            categories: CategoryTotals::from_slots(table),
            io_summary,
            timestamp: chrono::Utc::now(),
        })
    }

    /// Whether `clear()` has established a baseline yet.
    pub fn is_ready(&self) -> bool {
        self.table.is_some()
    }
}
