use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Flowbench - statistics aggregation engine with a synthetic workload driver
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Number of concurrent worker threads
    #[clap(short = 'c', long, default_value_t = crate::defaults::WORKERS)]
    pub workers: usize,

    /// Duration to run the workload (e.g. "10s", "5m")
    #[clap(short = 'd', long, value_parser = parse_duration, default_value = "5s")]
    pub duration: Duration,

    /// Interval between periodic snapshots (final snapshot always taken)
    #[clap(short = 'i', long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// I/O size in bytes attributed to each synthetic operation
    #[clap(short = 's', long, default_value_t = crate::defaults::IO_SIZE)]
    pub io_size: u64,

    /// Collect and report the per-operation latency histogram
    #[clap(long, default_value_t = false)]
    pub histogram: bool,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// JSON output file for streaming snapshot results during execution
    #[clap(long)]
    pub streaming_output: Option<PathBuf>,

    /// Verbose output (per-instance rollup lines, backend selection)
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Parse duration from string (e.g., "10s", "5m", "1h")
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs(num as u64),
        "m" => Duration::from_secs((num * 60.0) as u64),
        "h" => Duration::from_secs((num * 3600.0) as u64),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}
