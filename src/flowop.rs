//! Operation instances and the workload registry
//!
//! The statistics engine consumes an ordered collection of operation
//! instances from the workload engine. Instances sharing one name come in
//! three kinds: a `Definition` template (excluded from rollup), one `Master`
//! holding the name's rolled-up aggregate, and any number of `Runtime`
//! instances doing the actual concurrent work.
//!
//! Each instance's record sits behind its own `parking_lot::Mutex`. The
//! owning worker is the only writer, and both the worker and the snapshot
//! engine hold the lock only for a single update or a single copy-out. This
//! per-record window is the consistency mechanism for rollup; no lock is
//! ever held across the traversal, so workers on other records never stall.

use crate::stats::{FlowStats, OpKind};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Coarse grouping used for category-level totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Synchronous I/O operations.
    SyncIo,
    /// Asynchronous I/O operations.
    AsyncIo,
    /// Everything else (compute, metadata, coordination).
    Other,
}

/// Category-table slots: one per category plus the all-categories slot 0.
pub const CATEGORY_SLOTS: usize = 4;

impl Category {
    /// Slot of this category in the global table (slot 0 is "all").
    pub fn slot(self) -> usize {
        match self {
            Category::SyncIo => 1,
            Category::AsyncIo => 2,
            Category::Other => 3,
        }
    }

    pub const ALL: [Category; 3] = [Category::SyncIo, Category::AsyncIo, Category::Other];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::SyncIo => write!(f, "sync-io"),
            Category::AsyncIo => write!(f, "async-io"),
            Category::Other => write!(f, "other"),
        }
    }
}

/// Role of one instance within its operation name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceKind {
    /// Template an operation was defined from; never rolled up.
    Definition,
    /// Owner of the name's rolled-up aggregate.
    Master,
    /// A concurrently-executing worker instance.
    Runtime,
}

/// One operation instance with its private statistics record.
#[derive(Debug)]
pub struct FlowOp {
    name: String,
    instance: u32,
    kind: InstanceKind,
    category: Category,
    stats: Mutex<FlowStats>,
}

impl FlowOp {
    pub fn new(name: impl Into<String>, instance: u32, kind: InstanceKind, category: Category) -> Self {
        Self {
            name: name.into(),
            instance,
            kind,
            category,
            stats: Mutex::new(FlowStats::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn kind(&self) -> InstanceKind {
        self.kind
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Record one completed operation into this instance's record.
    ///
    /// Called only by the owning worker; the lock is held for the single
    /// counter update.
    pub fn record(&self, kind: OpKind, bytes: u64, latency_ns: u64, histogram_enabled: bool) {
        self.stats
            .lock()
            .record(kind, bytes, latency_ns, histogram_enabled);
    }

    /// Copy this instance's record out under its lock.
    pub fn stats(&self) -> FlowStats {
        *self.stats.lock()
    }

    /// Zero this instance's record, restoring the min-latency sentinel.
    pub fn reset_stats(&self) {
        self.stats.lock().reset();
    }

    /// Merge `other` into this instance's record (master rollup path).
    pub fn merge_stats(&self, other: &FlowStats) {
        self.stats.lock().merge(other);
    }
}

/// Process-wide ordered collection of operation instances, plus the run
/// flags the engine consumes from the workload layer.
///
/// Registration happens before workers spawn; afterwards the collection is
/// only traversed, so it needs no lock of its own.
#[derive(Debug, Default)]
pub struct Workload {
    ops: Vec<Arc<FlowOp>>,
    aborted: AtomicBool,
    histogram_enabled: AtomicBool,
}

impl Workload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instance, returning the shared handle its worker keeps.
    pub fn register(&mut self, op: FlowOp) -> Arc<FlowOp> {
        debug!(
            "Registering flowop {}-{} ({:?}, {})",
            op.name(),
            op.instance(),
            op.kind(),
            op.category()
        );
        let op = Arc::new(op);
        self.ops.push(Arc::clone(&op));
        op
    }

    /// Traverse all instances in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FlowOp>> {
        self.ops.iter()
    }

    /// Find the master instance for an operation name.
    ///
    /// Lookup is restricted to master-kind instances; runtime instances of
    /// the same name never match.
    pub fn find_master(&self, name: &str) -> Option<&Arc<FlowOp>> {
        self.ops
            .iter()
            .find(|op| op.kind() == InstanceKind::Master && op.name() == name)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Flag the run as aborted-with-error; suppresses report generation.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn set_histogram_enabled(&self, enabled: bool) {
        self.histogram_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn histogram_enabled(&self) -> bool {
        self.histogram_enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_master_skips_other_kinds() {
        let mut workload = Workload::new();
        workload.register(FlowOp::new(
            "seq-read",
            0,
            InstanceKind::Definition,
            Category::SyncIo,
        ));
        workload.register(FlowOp::new(
            "seq-read",
            1,
            InstanceKind::Runtime,
            Category::SyncIo,
        ));
        assert!(workload.find_master("seq-read").is_none());

        workload.register(FlowOp::new(
            "seq-read",
            0,
            InstanceKind::Master,
            Category::SyncIo,
        ));
        let master = workload.find_master("seq-read").unwrap();
        assert_eq!(master.kind(), InstanceKind::Master);
        assert!(workload.find_master("rand-write").is_none());
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut workload = Workload::new();
        for name in ["a", "b", "c"] {
            workload.register(FlowOp::new(name, 1, InstanceKind::Runtime, Category::Other));
        }
        let names: Vec<&str> = workload.iter().map(|op| op.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_record_through_handle() {
        let mut workload = Workload::new();
        let op = workload.register(FlowOp::new(
            "rand-write",
            1,
            InstanceKind::Runtime,
            Category::SyncIo,
        ));

        op.record(OpKind::Write, 4096, 1_500_000, false);
        op.record(OpKind::Write, 4096, 2_500_000, false);

        let stats = op.stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.write_bytes, 8192);
        assert_eq!(stats.min_latency_ns, 1_500_000);
        assert_eq!(stats.max_latency_ns, 2_500_000);
    }

    #[test]
    fn test_run_flags() {
        let workload = Workload::new();
        assert!(!workload.is_aborted());
        assert!(!workload.histogram_enabled());

        workload.set_histogram_enabled(true);
        workload.abort();
        assert!(workload.is_aborted());
        assert!(workload.histogram_enabled());
    }

    #[test]
    fn test_category_slots_distinct() {
        let mut seen = vec![false; CATEGORY_SLOTS];
        seen[0] = true; // all-categories slot
        for cat in Category::ALL {
            assert!(!seen[cat.slot()], "slot collision for {}", cat);
            seen[cat.slot()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
