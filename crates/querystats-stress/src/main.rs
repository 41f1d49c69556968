//! querystats-stress - Synthetic workload driver for the statistics collector.
//!
//! Spawns worker threads that issue randomized statement executions against a
//! shared collector, then reports collector info and the top statements at a
//! fixed interval. Exists to exercise the concurrency model under load and to
//! show what embedding the collector looks like from a host's point of view.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use querystats_core::{
    CallerId, CollectorConfig, CollectorInfo, CollectorState, CommandKind, ExecutionCounters,
    PlanDescriptor, Recorder, StatEntry, init, memory_footprint, statement_id,
};

/// Synthetic workload driver for the statement statistics collector.
#[derive(Parser)]
#[command(
    name = "querystats-stress",
    about = "Synthetic workload driver for querystats",
    version
)]
struct Args {
    /// Number of worker threads issuing executions.
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Number of distinct synthetic statements in the workload.
    #[arg(short, long, default_value = "64")]
    statements: usize,

    /// Reporting interval in seconds.
    #[arg(short, long, default_value = "5")]
    interval: u64,

    /// Statement table capacity (collector max_entries).
    #[arg(long, default_value = "5000")]
    max_entries: usize,

    /// Event buffer size (e.g., "1M", "64K", "1048576").
    #[arg(long, default_value = "1M", value_parser = parse_size)]
    buffer_size: usize,

    /// Sampling rate in percent, 1-100.
    #[arg(long, default_value = "100")]
    sample_rate: u32,

    /// Enable recording. Disable with --enabled=false to measure the gate alone.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    enabled: bool,

    /// Pause between executions per worker, microseconds. 0 runs flat out.
    #[arg(long, default_value = "100")]
    pace_us: u64,

    /// Number of top statements (by total time) shown per report.
    #[arg(long, default_value = "10")]
    top: usize,

    /// Emit reports as JSON lines on stdout instead of log lines.
    #[arg(long)]
    json: bool,

    /// Reset the collector after every N reports. 0 disables periodic resets.
    #[arg(long, default_value = "0")]
    reset_every: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a human-readable size string (e.g., "1M", "64K", "1048576") into bytes.
fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".to_string());
    }

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix('G') {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('M') {
        (num, 1024 * 1024)
    } else if let Some(num) = s.strip_suffix('K') {
        (num, 1024)
    } else {
        (s, 1)
    };

    num_str
        .trim()
        .parse::<usize>()
        .map(|n| n * multiplier)
        .map_err(|e| format!("invalid size '{}': {}", s, e))
}

/// Formats bytes as human-readable size string.
fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("querystats_stress={}", level).parse().unwrap())
        .add_directive(format!("querystats_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// One synthetic statement of the workload: a stable id, a baseline plan,
/// and a baseline latency the jitter builds on.
struct SyntheticStatement {
    id: u64,
    plan: PlanDescriptor,
    base_elapsed_us: u64,
}

/// Kind mix for the workload, weighted towards reads.
const KINDS: [CommandKind; 6] = [
    CommandKind::Select,
    CommandKind::Select,
    CommandKind::Select,
    CommandKind::Insert,
    CommandKind::Update,
    CommandKind::Delete,
];

fn statement_text(kind: CommandKind, i: usize) -> String {
    match kind {
        CommandKind::Select => format!("SELECT * FROM t{} WHERE id = $1", i),
        CommandKind::Insert => format!("INSERT INTO t{} (id, v) VALUES ($1, $2)", i),
        CommandKind::Update => format!("UPDATE t{} SET v = $1 WHERE id = $2", i),
        CommandKind::Delete => format!("DELETE FROM t{} WHERE id = $1", i),
        CommandKind::Merge => format!("MERGE INTO t{} USING src ON t{}.id = src.id", i, i),
        CommandKind::Utility => format!("VACUUM t{}", i),
    }
}

fn build_workload(count: usize) -> Vec<SyntheticStatement> {
    (0..count)
        .map(|i| {
            let kind = KINDS[i % KINDS.len()];
            let text = statement_text(kind, i);
            SyntheticStatement {
                id: statement_id(&text),
                plan: PlanDescriptor {
                    kind,
                    // Selects return rows; every third DML has a RETURNING clause.
                    returns_rows: kind == CommandKind::Select || i % 3 == 0,
                    has_modifying_cte: i % 16 == 9,
                    range_table_count: 1 + (i % 4) as u32,
                },
                base_elapsed_us: 200 + (i as u64 % 10) * 150,
            }
        })
        .collect()
}

/// Statement id to command-kind label, resolved once for the report lines.
fn kind_labels(workload: &[SyntheticStatement]) -> HashMap<u64, &'static str> {
    workload
        .iter()
        .map(|s| (s.id, s.plan.kind.label()))
        .collect()
}

fn run_worker(
    recorder: Recorder,
    workload: Arc<Vec<SyntheticStatement>>,
    pace: Duration,
    running: Arc<AtomicBool>,
    ops: Arc<AtomicU64>,
) {
    let mut rng = rand::thread_rng();
    while running.load(Ordering::SeqCst) {
        // Squared draw biases towards low indices: a few hot statements and
        // a long tail, so the top-N report has a stable shape.
        let r: f64 = rng.gen_range(0.0..1.0);
        let idx = ((r * r) * workload.len() as f64) as usize;
        let stmt = &workload[idx.min(workload.len() - 1)];

        let mut plan = stmt.plan;
        if rng.gen_ratio(1, 64) {
            // Occasional optimizer flip: one extra relation in the plan.
            plan.range_table_count += 1;
        }

        let elapsed =
            Duration::from_micros(stmt.base_elapsed_us + rng.gen_range(0..stmt.base_elapsed_us));
        let row_count = rng.gen_range(0..200);
        let counters = ExecutionCounters {
            rows: row_count,
            shared_blocks_hit: (row_count * 3) as f64,
            shared_blocks_read: (row_count / 4) as f64,
            temp_blocks_written: if row_count > 150 { 8.0 } else { 0.0 },
        };
        let caller = CallerId {
            user_id: rng.gen_range(10..15),
            db_id: rng.gen_range(1..4),
        };

        recorder.record(stmt.id, Some(&plan), elapsed, &counters, caller);
        ops.fetch_add(1, Ordering::Relaxed);

        if !pace.is_zero() {
            thread::sleep(pace);
        }
    }
}

/// One reporting interval in JSON-lines form.
#[derive(Serialize)]
struct Report {
    at: String,
    report: u64,
    ops_per_sec: u64,
    info: CollectorInfo,
    top: Vec<StatEntry>,
}

fn top_entries(mut snapshot: Vec<StatEntry>, n: usize) -> Vec<StatEntry> {
    snapshot.sort_by(|a, b| b.total_time_us.cmp(&a.total_time_us));
    snapshot.truncate(n);
    snapshot
}

fn describe_entry(entry: &StatEntry, kind: &str) -> String {
    format!(
        "stmt={:016x} kind={} calls={} total={:.1}ms mean={}us rows={} plan_changes={}",
        entry.statement_id,
        kind,
        entry.call_count,
        entry.total_time_us as f64 / 1000.0,
        entry.mean_time_us,
        entry.row_count,
        entry.plan_change_count
    )
}

fn print_report(
    n: u64,
    ops_per_sec: u64,
    state: &CollectorState,
    labels: &HashMap<u64, &'static str>,
    top_n: usize,
    json: bool,
) {
    let info = state.info();
    let top = top_entries(state.snapshot(), top_n);

    if json {
        let report = Report {
            at: Utc::now().to_rfc3339(),
            report: n,
            ops_per_sec,
            info,
            top,
        };
        match serde_json::to_string(&report) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
        return;
    }

    info!(
        "Report #{}: {} ops/s, live={}/{}, seen={}, sampled={}, overflow={}",
        n,
        ops_per_sec,
        info.live_count,
        info.max_entries,
        info.total_seen,
        info.total_sampled,
        info.overflow_count
    );
    for entry in &top {
        let kind = labels.get(&entry.statement_id).copied().unwrap_or("?");
        info!("  {}", describe_entry(entry, kind));
    }
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = CollectorConfig {
        max_entries: args.max_entries,
        buffer_size: args.buffer_size,
        enabled: args.enabled,
        sample_rate_percent: args.sample_rate,
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(2);
    }
    if args.workers == 0 || args.statements == 0 {
        error!("workers and statements must both be at least 1");
        std::process::exit(2);
    }

    info!("querystats-stress {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Workload: workers={}, statements={}, pace={}us, interval={}s",
        args.workers, args.statements, args.pace_us, args.interval
    );
    info!(
        "Collector: max_entries={}, buffer_size={}, sample_rate={}%, footprint ~{}",
        args.max_entries,
        format_size(args.buffer_size as u64),
        args.sample_rate,
        format_size(memory_footprint(&config) as u64)
    );

    let state = init(config);
    let workload = Arc::new(build_workload(args.statements));
    let labels = kind_labels(&workload);
    let ops = Arc::new(AtomicU64::new(0));

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut workers = Vec::with_capacity(args.workers);
    for _ in 0..args.workers {
        let recorder = state.recorder();
        let workload = Arc::clone(&workload);
        let running = Arc::clone(&running);
        let ops = Arc::clone(&ops);
        let pace = Duration::from_micros(args.pace_us);
        workers.push(thread::spawn(move || {
            run_worker(recorder, workload, pace, running, ops)
        }));
    }

    info!(
        "Started {} workers over {} synthetic statements",
        args.workers, args.statements
    );

    let interval = Duration::from_secs(args.interval);
    let mut report_count: u64 = 0;
    let mut last_ops: u64 = 0;

    while running.load(Ordering::SeqCst) {
        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        report_count += 1;
        let total_ops = ops.load(Ordering::Relaxed);
        let rate = (total_ops - last_ops) / args.interval.max(1);
        last_ops = total_ops;

        print_report(report_count, rate, &state, &labels, args.top, args.json);

        if args.reset_every > 0 && report_count.is_multiple_of(args.reset_every) {
            info!("Periodic reset after report #{}", report_count);
            state.reset();
        }
    }

    // Graceful shutdown
    info!("Shutting down...");
    for worker in workers {
        if worker.join().is_err() {
            error!("Worker thread panicked");
        }
    }

    // Final numbers after the workers stop.
    print_report(report_count + 1, 0, &state, &labels, args.top, args.json);
    info!("Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_size_accepts_suffixes_and_raw_bytes() {
        assert_eq!(parse_size("1M"), Ok(1_048_576));
        assert_eq!(parse_size("64K"), Ok(65_536));
        assert_eq!(parse_size("123"), Ok(123));
        assert_eq!(parse_size(" 2M "), Ok(2_097_152));
        assert!(parse_size("").is_err());
        assert!(parse_size("12Q").is_err());
    }

    #[test]
    fn format_size_picks_the_right_unit() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(65_536), "64.0K");
        assert_eq!(format_size(1_048_576), "1.0M");
    }

    #[test]
    fn workload_ids_are_unique_and_stable() {
        let a = build_workload(64);
        let b = build_workload(64);
        let ids: HashSet<u64> = a.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 64);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
        }
    }

    #[test]
    fn kind_labels_cover_the_workload() {
        let workload = build_workload(12);
        let labels = kind_labels(&workload);
        assert_eq!(labels.len(), 12);
        // The kind mix starts with three selects, then an insert.
        assert_eq!(labels.get(&workload[0].id).copied(), Some("select"));
        assert_eq!(labels.get(&workload[3].id).copied(), Some("insert"));
    }

    #[test]
    fn top_entries_sorts_by_total_time_and_truncates() {
        let entries = vec![
            StatEntry {
                statement_id: 1,
                total_time_us: 5,
                ..StatEntry::default()
            },
            StatEntry {
                statement_id: 2,
                total_time_us: 50,
                ..StatEntry::default()
            },
            StatEntry {
                statement_id: 3,
                total_time_us: 20,
                ..StatEntry::default()
            },
        ];
        let top = top_entries(entries, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].statement_id, 2);
        assert_eq!(top[1].statement_id, 3);
    }

    #[test]
    fn describe_entry_includes_call_and_time_figures() {
        let entry = StatEntry {
            statement_id: 0xabc,
            call_count: 7,
            total_time_us: 14_000,
            mean_time_us: 2000,
            ..StatEntry::default()
        };
        let line = describe_entry(&entry, "select");
        assert!(line.contains("kind=select"));
        assert!(line.contains("calls=7"));
        assert!(line.contains("total=14.0ms"));
        assert!(line.contains("mean=2000us"));
    }
}
