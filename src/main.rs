//! # Flowbench - Workload Driver Entry Point
//!
//! Synthetic workload driver for the statistics engine. It spawns a set of
//! worker threads, each owning runtime instances of a few flow operations,
//! and lets them accumulate synthetic op/byte/latency counters while the
//! main thread takes periodic snapshots. This exercises the full engine:
//! lifecycle (`clear`), concurrent accumulation, rollup into category and
//! master records, CPU time sampling, report emission, and JSON results
//! output.
//!
//! The log level is controlled via `RUST_LOG`; `--verbose` additionally
//! enables the per-instance rollup lines at debug level.

use anyhow::Result;
use clap::Parser;
use flowbench::{
    cli::Args,
    cputime,
    logging::ReportFormatter,
    results::ResultsManager,
    snapshot::StatsCollector,
    stats::OpKind,
    Category, FlowOp, InstanceKind, Workload,
};
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Synthetic operation table: name, counter attribution, category, and the
/// simulated latency range in microseconds.
const SYNTH_OPS: &[(&str, OpKind, Category, (u64, u64))] = &[
    ("seq-read", OpKind::Read, Category::SyncIo, (80, 400)),
    ("rand-write", OpKind::Write, Category::SyncIo, (150, 2_500)),
    ("async-flush", OpKind::Write, Category::AsyncIo, (40, 9_000)),
    ("checksum", OpKind::Other, Category::Other, (10, 120)),
];

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "flowbench=debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(ReportFormatter)
        .init();

    info!("Starting flowbench workload driver");
    info!(
        "Configuration: {} workers, {:?} run, {} byte ops, histogram {}",
        args.workers,
        args.duration,
        args.io_size,
        if args.histogram { "on" } else { "off" }
    );

    // Build the workload: per operation name one definition template, one
    // master, and one runtime instance per worker thread.
    let mut workload = Workload::new();
    let mut worker_ops: Vec<Vec<(Arc<FlowOp>, OpKind, (u64, u64))>> =
        vec![Vec::new(); args.workers];

    for &(name, kind, category, latency_us) in SYNTH_OPS {
        workload.register(FlowOp::new(name, 0, InstanceKind::Definition, category));
        workload.register(FlowOp::new(name, 0, InstanceKind::Master, category));
        for worker in 0..args.workers {
            let op = workload.register(FlowOp::new(
                name,
                worker as u32 + 1,
                InstanceKind::Runtime,
                category,
            ));
            worker_ops[worker].push((op, kind, latency_us));
        }
    }
    workload.set_histogram_enabled(args.histogram);

    // The CPU backend is probed once here and injected; the collector
    // captures its baseline on construction.
    let mut stats = StatsCollector::new(cputime::probe());

    let mut results_manager = ResultsManager::new(&args.output_file)?;
    if let Some(ref streaming_file) = args.streaming_output {
        info!("Enabling snapshot streaming to: {:?}", streaming_file);
        results_manager.enable_streaming(streaming_file)?;
    }

    stats.clear(&workload)?;

    let deadline = Instant::now() + args.duration;
    let io_size = args.io_size;
    let histogram = workload.histogram_enabled();

    let handles: Vec<_> = worker_ops
        .into_iter()
        .map(|ops| thread::spawn(move || worker_loop(ops, deadline, io_size, histogram)))
        .collect();

    // Periodic snapshots while the workers run; each one reports cumulative
    // totals since the clear above.
    if let Some(interval) = args.interval {
        while Instant::now() + interval < deadline {
            thread::sleep(interval);
            match stats.snapshot(&workload) {
                Ok(results) => results_manager.add_results(results)?,
                Err(e) => error!("Periodic snapshot failed: {}", e),
            }
        }
    }

    let remaining = deadline.saturating_duration_since(Instant::now());
    thread::sleep(remaining);

    for handle in handles {
        if handle.join().is_err() {
            error!("Worker thread panicked; aborting run");
            workload.abort();
        }
    }

    // Final snapshot covers the whole measurement phase.
    let results = stats.snapshot(&workload)?;
    results_manager.add_results(results)?;
    results_manager.finalize()?;

    info!("Flowbench run completed successfully");
    Ok(())
}

/// Worker body: accumulate synthetic operations into this worker's runtime
/// instances until the deadline.
fn worker_loop(
    ops: Vec<(Arc<FlowOp>, OpKind, (u64, u64))>,
    deadline: Instant,
    io_size: u64,
    histogram: bool,
) {
    let mut rng = rand::thread_rng();

    while Instant::now() < deadline {
        for (op, kind, (lo_us, hi_us)) in &ops {
            let latency_ns = rng.gen_range(*lo_us..*hi_us) * 1_000;
            let bytes = match kind {
                OpKind::Other => 0,
                _ => io_size,
            };
            op.record(*kind, bytes, latency_ns, histogram);
        }
        // Pace the loop so a demo run does not saturate a core.
        thread::sleep(Duration::from_micros(250));
    }
}
