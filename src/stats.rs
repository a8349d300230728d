//! Flow statistics records and the merge algebra
//!
//! Every operation instance owns one [`FlowStats`] record and accumulates
//! counters into it as operations complete. Snapshot generation repeatedly
//! merges these per-instance records into category totals and per-name master
//! records, so the merge operation is the heart of the engine:
//!
//! - counts, byte totals, accumulated latency, and histogram buckets are
//!   summed (associative and commutative),
//! - minimum/maximum latency are reduced with `min`/`max`.
//!
//! The minimum-latency field uses `u64::MAX` as its "no observations yet"
//! sentinel. The sentinel is enforced at construction time everywhere a
//! record comes into existence (`new`, `Default`, `reset`), so a zero-count
//! record is always merge-neutral. A record whose minimum was wrongly zeroed
//! would drag every aggregate minimum down to zero; see the regression test
//! at the bottom of this module.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Number of cells in the fixed latency-distribution histogram.
pub const HISTOGRAM_BUCKETS: usize = 64;

/// "No observations yet" sentinel for `min_latency_ns`.
pub const LATENCY_MIN_SENTINEL: u64 = u64::MAX;

/// Classifies one completed operation for counter attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Counts toward the read-op and read-byte totals.
    Read,
    /// Counts toward the write-op and write-byte totals.
    Write,
    /// Counts only toward the overall op and byte totals.
    Other,
}

/// Fixed-length latency distribution on a log2-of-microseconds scale.
///
/// Bucket `i` counts operations whose latency satisfies
/// `ilog2(max(1, latency_us)) == i`, with the last bucket absorbing
/// everything beyond the scale. Buckets merge elementwise, so the bucket sum
/// always equals the total operation count once collection is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyHistogram {
    buckets: [u64; HISTOGRAM_BUCKETS],
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: [0; HISTOGRAM_BUCKETS],
        }
    }

    /// Bucket index for a latency in nanoseconds.
    fn bucket_index(latency_ns: u64) -> usize {
        let us = (latency_ns / 1_000).max(1);
        (us.ilog2() as usize).min(HISTOGRAM_BUCKETS - 1)
    }

    /// Record one observation.
    pub fn record(&mut self, latency_ns: u64) {
        self.buckets[Self::bucket_index(latency_ns)] += 1;
    }

    /// Elementwise sum of another histogram into this one.
    pub fn merge(&mut self, other: &LatencyHistogram) {
        for (a, b) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *a += *b;
        }
    }

    /// Sum of all bucket counts.
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    pub fn buckets(&self) -> &[u64; HISTOGRAM_BUCKETS] {
        &self.buckets
    }

    pub fn reset(&mut self) {
        self.buckets = [0; HISTOGRAM_BUCKETS];
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// serde's derived array support stops at 32 elements on the Deserialize
// side, so the 64-cell bucket array is serialized as a plain sequence.
impl Serialize for LatencyHistogram {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.buckets.iter())
    }
}

impl<'de> Deserialize<'de> for LatencyHistogram {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<u64>::deserialize(deserializer)?;
        let buckets: [u64; HISTOGRAM_BUCKETS] = values.try_into().map_err(|v: Vec<u64>| {
            serde::de::Error::invalid_length(v.len(), &"a 64-element bucket array")
        })?;
        Ok(Self { buckets })
    }
}

/// One statistics record: the per-instance accumulator, the per-name master
/// aggregate, and the category-table slots are all values of this type.
///
/// A record is owned exclusively by its operation instance until it is
/// merged; merging never mutates the source. Invariants: `bytes` equals
/// `read_bytes + write_bytes` for pure read/write workloads, and for
/// `count > 0` the minimum latency never exceeds the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowStats {
    pub count: u64,
    pub read_count: u64,
    pub write_count: u64,
    pub bytes: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    /// Sum of per-op latencies, nanoseconds.
    pub total_latency_ns: u64,
    /// `LATENCY_MIN_SENTINEL` until the first observation.
    pub min_latency_ns: u64,
    pub max_latency_ns: u64,
    /// CPU time attributed to this record's operations, nanoseconds.
    pub cpu_time_ns: u64,
    pub histogram: LatencyHistogram,
    /// Collection window start, monotonic nanoseconds.
    pub start_ns: u64,
    /// Collection window end, monotonic nanoseconds.
    pub end_ns: u64,
}

impl FlowStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            read_count: 0,
            write_count: 0,
            bytes: 0,
            read_bytes: 0,
            write_bytes: 0,
            total_latency_ns: 0,
            min_latency_ns: LATENCY_MIN_SENTINEL,
            max_latency_ns: 0,
            cpu_time_ns: 0,
            histogram: LatencyHistogram::new(),
            start_ns: 0,
            end_ns: 0,
        }
    }

    /// Zero every counter, restoring the min-latency sentinel.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record one completed operation.
    pub fn record(&mut self, kind: OpKind, bytes: u64, latency_ns: u64, histogram_enabled: bool) {
        self.count += 1;
        self.bytes += bytes;
        self.total_latency_ns += latency_ns;

        match kind {
            OpKind::Read => {
                self.read_count += 1;
                self.read_bytes += bytes;
            }
            OpKind::Write => {
                self.write_count += 1;
                self.write_bytes += bytes;
            }
            OpKind::Other => {}
        }

        if latency_ns > self.max_latency_ns {
            self.max_latency_ns = latency_ns;
        }
        if latency_ns < self.min_latency_ns {
            self.min_latency_ns = latency_ns;
        }

        if histogram_enabled {
            self.histogram.record(latency_ns);
        }
    }

    /// Merge `other` into `self`, leaving `other` untouched.
    ///
    /// Sums all counters and histogram buckets; reduces min/max latency.
    /// A freshly constructed (zero-count, sentinel-min) record merges as a
    /// no-op.
    pub fn merge(&mut self, other: &FlowStats) {
        self.count += other.count;
        self.read_count += other.read_count;
        self.write_count += other.write_count;
        self.bytes += other.bytes;
        self.read_bytes += other.read_bytes;
        self.write_bytes += other.write_bytes;
        self.total_latency_ns += other.total_latency_ns;
        self.cpu_time_ns += other.cpu_time_ns;

        if other.max_latency_ns > self.max_latency_ns {
            self.max_latency_ns = other.max_latency_ns;
        }
        if other.min_latency_ns < self.min_latency_ns {
            self.min_latency_ns = other.min_latency_ns;
        }

        self.histogram.merge(&other.histogram);
    }

    /// Minimum latency in milliseconds; 0 with no observations.
    pub fn min_latency_ms(&self) -> f64 {
        if self.count == 0 || self.min_latency_ns == LATENCY_MIN_SENTINEL {
            0.0
        } else {
            self.min_latency_ns as f64 / 1e6
        }
    }

    /// Maximum latency in milliseconds.
    pub fn max_latency_ms(&self) -> f64 {
        self.max_latency_ns as f64 / 1e6
    }
}

impl Default for FlowStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations per second, 0 when no time has elapsed.
pub fn ops_per_sec(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}

/// Decimal megabytes per second, 0 when no time has elapsed.
pub fn mb_per_sec(bytes: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        bytes as f64 / 1e6 / elapsed_secs
    } else {
        0.0
    }
}

/// Mean per-op latency in milliseconds, 0 when no ops completed.
pub fn avg_latency_ms(total_latency_ns: u64, count: u64) -> f64 {
    if count > 0 {
        total_latency_ns as f64 / (count as f64 * 1e6)
    } else {
        0.0
    }
}

/// Mean CPU microseconds per op. `cpu_ns` is a relative sample that goes
/// negative when the CPU source is degraded; the nonsensical figure is
/// reported as-is rather than masked.
pub fn cpu_us_per_op(cpu_ns: i64, count: u64) -> f64 {
    if count > 0 {
        cpu_ns as f64 / 1_000.0 / count as f64
    } else {
        0.0
    }
}

/// Monotonic nanoseconds since the first call in this process.
///
/// Statistics timestamps only ever participate in differences, so an
/// arbitrary process-local epoch is sufficient.
pub fn hrtime_ns() -> u64 {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(count: u64, bytes: u64, min_ns: u64, max_ns: u64) -> FlowStats {
        let mut s = FlowStats::new();
        s.count = count;
        s.read_count = count;
        s.bytes = bytes;
        s.read_bytes = bytes;
        s.total_latency_ns = count * 1_000_000;
        s.min_latency_ns = min_ns;
        s.max_latency_ns = max_ns;
        s
    }

    #[test]
    fn test_merge_sums_counts_and_bytes() {
        let mut a = synthetic(10, 1000, 100, 5000);
        let b = synthetic(20, 2000, 50, 9000);

        a.merge(&b);
        assert_eq!(a.count, 30);
        assert_eq!(a.bytes, 3000);
        assert_eq!(a.min_latency_ns, 50);
        assert_eq!(a.max_latency_ns, 9000);
    }

    #[test]
    fn test_merge_commutative() {
        let x = synthetic(3, 300, 10, 40);
        let y = synthetic(7, 700, 5, 95);

        let mut xy = x;
        xy.merge(&y);
        let mut yx = y;
        yx.merge(&x);

        assert_eq!(xy, yx);
    }

    #[test]
    fn test_merge_associative() {
        let a = synthetic(1, 10, 8, 9);
        let b = synthetic(2, 20, 4, 6);
        let c = synthetic(3, 30, 2, 12);

        // (a + b) + c
        let mut left = a;
        left.merge(&b);
        left.merge(&c);

        // a + (b + c)
        let mut bc = b;
        bc.merge(&c);
        let mut right = a;
        right.merge(&bc);

        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_with_empty_record_is_identity() {
        let mut a = synthetic(10, 1000, 100, 5000);
        let before = a;

        a.merge(&FlowStats::new());
        assert_eq!(a, before);
    }

    #[test]
    fn test_zeroed_min_corrupts_aggregate_minimum() {
        // Regression guard for the sentinel convention: a record whose min
        // field defaulted to 0 instead of the sentinel drags the aggregate
        // minimum to zero even though it observed nothing.
        let mut corrupt = FlowStats::new();
        corrupt.min_latency_ns = 0;

        let mut a = synthetic(10, 1000, 100, 5000);
        a.merge(&corrupt);
        assert_eq!(a.min_latency_ns, 0, "zeroed min must visibly corrupt");

        // The constructors all honor the sentinel, so this cannot happen to
        // a record produced by this crate.
        assert_eq!(FlowStats::new().min_latency_ns, LATENCY_MIN_SENTINEL);
        assert_eq!(FlowStats::default().min_latency_ns, LATENCY_MIN_SENTINEL);
        let mut reset = synthetic(5, 50, 1, 2);
        reset.reset();
        assert_eq!(reset.min_latency_ns, LATENCY_MIN_SENTINEL);
    }

    #[test]
    fn test_record_tracks_min_max_and_rw_split() {
        let mut s = FlowStats::new();
        s.record(OpKind::Read, 4096, 2_000_000, false);
        s.record(OpKind::Write, 8192, 500_000, false);
        s.record(OpKind::Other, 0, 7_000_000, false);

        assert_eq!(s.count, 3);
        assert_eq!(s.read_count, 1);
        assert_eq!(s.write_count, 1);
        assert_eq!(s.bytes, 12288);
        assert_eq!(s.read_bytes, 4096);
        assert_eq!(s.write_bytes, 8192);
        assert_eq!(s.min_latency_ns, 500_000);
        assert_eq!(s.max_latency_ns, 7_000_000);
        assert_eq!(s.bytes, s.read_bytes + s.write_bytes);
    }

    #[test]
    fn test_histogram_sum_equals_count_after_merges() {
        let mut merged = FlowStats::new();
        let latencies_us: [&[u64]; 3] = [&[1, 2, 4, 8], &[16, 32, 64], &[128, 256]];

        for worker in latencies_us {
            let mut s = FlowStats::new();
            for &us in worker {
                s.record(OpKind::Read, 512, us * 1_000, true);
            }
            assert_eq!(s.histogram.total(), s.count);
            merged.merge(&s);
        }

        assert_eq!(merged.count, 9);
        assert_eq!(merged.histogram.total(), merged.count);
    }

    #[test]
    fn test_histogram_bucket_scale() {
        // Sub-microsecond latencies land in bucket 0; the scale is
        // log2(microseconds) above that.
        assert_eq!(LatencyHistogram::bucket_index(500), 0);
        assert_eq!(LatencyHistogram::bucket_index(1_000), 0);
        assert_eq!(LatencyHistogram::bucket_index(2_000), 1);
        assert_eq!(LatencyHistogram::bucket_index(1_000_000), 9);
        // Top of the scale: ilog2(u64::MAX / 1000) = 54, safely in range.
        assert_eq!(LatencyHistogram::bucket_index(u64::MAX), 54);
    }

    #[test]
    fn test_rate_helpers_guard_zero_denominators() {
        assert_eq!(ops_per_sec(100, 10.0), 10.0);
        assert_eq!(ops_per_sec(100, 0.0), 0.0);
        assert_eq!(mb_per_sec(5_000_000, 2.0), 2.5);
        assert_eq!(mb_per_sec(5_000_000, 0.0), 0.0);
        assert_eq!(avg_latency_ms(10_000_000, 10), 1.0);
        assert_eq!(avg_latency_ms(10_000_000, 0), 0.0);
        assert_eq!(cpu_us_per_op(2_000_000, 1000), 2.0);
        assert_eq!(cpu_us_per_op(2_000_000, 0), 0.0);
    }

    #[test]
    fn test_cpu_per_op_surfaces_degraded_sample() {
        // A failed CPU source yields a negative relative sample; the figure
        // must come through negative, not zeroed.
        assert!(cpu_us_per_op(-1, 100) < 0.0);
    }

    #[test]
    fn test_flowstats_json_round_trip() {
        let mut s = FlowStats::new();
        s.record(OpKind::Write, 1024, 3_000_000, true);

        let json = serde_json::to_string(&s).unwrap();
        let back: FlowStats = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn test_hrtime_is_monotonic() {
        let a = hrtime_ns();
        let b = hrtime_ns();
        assert!(b >= a);
    }
}
