//! Shared collector state and its administrative surface.
//!
//! One `CollectorState` per host process, created by `init` and shared
//! behind an `Arc`: recorders clone the `Arc` for the write side, while
//! administrative callers use `snapshot`/`reset`/`info` directly. Dropping
//! the last handle is the teardown; there is no destructor beyond that.

use std::mem::size_of;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::info;

use crate::config::CollectorConfig;
use crate::recorder::Recorder;
use crate::ring::EventRingBuffer;
use crate::table::{StatEntry, StatsTable};

/// Crate version reported by `info`.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state: configuration, the statistics table, and the reserved
/// event buffer.
pub struct CollectorState {
    config: CollectorConfig,
    table: StatsTable,
    events: Mutex<EventRingBuffer>,
}

/// Creates the shared state for a configuration.
///
/// Capacity parameters are honored as given; run values that come from user
/// input through `CollectorConfig::validate` first.
pub fn init(config: CollectorConfig) -> Arc<CollectorState> {
    let state = CollectorState {
        table: StatsTable::new(config.max_entries),
        events: Mutex::new(EventRingBuffer::new(config.buffer_size)),
        config,
    };
    info!(
        max_entries = state.config.max_entries,
        buffer_size = state.config.buffer_size,
        enabled = state.config.enabled,
        sample_rate_percent = state.config.sample_rate_percent,
        "statement statistics collector initialized"
    );
    Arc::new(state)
}

impl CollectorState {
    /// Write-side handle for an execution context.
    pub fn recorder(self: &Arc<Self>) -> Recorder {
        Recorder::new(Arc::clone(self))
    }

    /// The configuration this state was initialized with, read-only for its
    /// lifetime.
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub(crate) fn table(&self) -> &StatsTable {
        &self.table
    }

    /// Locks the reserved event buffer for direct access.
    ///
    /// The recording path does not produce events yet; the handle exists for
    /// forward compatibility and for the reset path.
    pub fn events(&self) -> MutexGuard<'_, EventRingBuffer> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copies of all live entries, in claim order.
    pub fn snapshot(&self) -> Vec<StatEntry> {
        self.table.snapshot()
    }

    /// Clears all entries, the aggregate counters, and the event buffer.
    /// Idempotent, and safe while recorders are active (see
    /// `StatsTable::reset`).
    pub fn reset(&self) {
        self.table.reset();
        self.events().reset();
        info!("statement statistics reset");
    }

    /// Point-in-time operational summary.
    pub fn info(&self) -> CollectorInfo {
        CollectorInfo {
            version: VERSION,
            enabled: self.config.enabled,
            max_entries: self.config.max_entries,
            buffer_size: self.config.buffer_size,
            sample_rate_percent: self.config.sample_rate_percent,
            live_count: self.table.live_count(),
            total_seen: self.table.total_seen(),
            total_sampled: self.table.total_sampled(),
            overflow_count: self.table.overflow_count(),
            last_reset_at: self.table.last_reset_at(),
        }
    }
}

/// Operational summary returned by `CollectorState::info`.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct CollectorInfo {
    /// Crate version string.
    pub version: &'static str,
    /// Whether recording is enabled.
    pub enabled: bool,
    /// Configured statement-table capacity.
    pub max_entries: usize,
    /// Configured event buffer size, bytes.
    pub buffer_size: usize,
    /// Configured sampling rate, percent.
    pub sample_rate_percent: u32,
    /// Claimed table slots at the time of the call.
    pub live_count: usize,
    /// Executions committed since the last reset.
    pub total_seen: i64,
    /// Executions that passed sampling since the last reset.
    pub total_sampled: i64,
    /// New-statement drops against a full table since the last reset.
    pub overflow_count: i64,
    /// When the counters were last reset (microseconds since Unix epoch).
    pub last_reset_at: i64,
}

/// Approximate resident cost of a configuration, bytes: state header, slot
/// array, index capacity, and the event buffer. A startup sizing aid, not an
/// exact accounting.
pub fn memory_footprint(config: &CollectorConfig) -> usize {
    size_of::<CollectorState>()
        + config.max_entries * size_of::<Mutex<StatEntry>>()
        + config.max_entries * (size_of::<u64>() + size_of::<usize>())
        + config.buffer_size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{CallerId, ExecutionCounters};
    use std::thread;
    use std::time::Duration;

    fn sampled_config(max_entries: usize) -> CollectorConfig {
        CollectorConfig {
            max_entries,
            buffer_size: 65_536,
            enabled: true,
            sample_rate_percent: 100,
        }
    }

    fn rows(n: i64) -> ExecutionCounters {
        ExecutionCounters {
            rows: n,
            ..ExecutionCounters::default()
        }
    }

    #[test]
    fn fresh_state_reports_clean_info() {
        let state = init(sampled_config(100));
        let info = state.info();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.enabled);
        assert_eq!(info.max_entries, 100);
        assert_eq!(info.buffer_size, 65_536);
        assert_eq!(info.sample_rate_percent, 100);
        assert_eq!(info.live_count, 0);
        assert_eq!(info.total_seen, 0);
        assert_eq!(info.total_sampled, 0);
        assert_eq!(info.overflow_count, 0);
        assert!(info.last_reset_at > 0);
    }

    #[test]
    fn two_entry_scenario_matches_expected_aggregates() {
        let state = init(sampled_config(2));
        let recorder = state.recorder();
        let caller = CallerId::default();

        recorder.record(10, None, Duration::from_millis(5), &rows(1), caller);
        recorder.record(20, None, Duration::from_millis(3), &rows(1), caller);
        recorder.record(10, None, Duration::from_millis(7), &rows(1), caller);
        // Table is full; statement 30 is dropped.
        recorder.record(30, None, Duration::from_millis(1), &rows(1), caller);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 2);

        let ten = snapshot.iter().find(|e| e.statement_id == 10).unwrap();
        assert_eq!(ten.call_count, 2);
        assert_eq!(ten.total_time_us, 12_000);
        assert_eq!(ten.mean_time_us, 6000);

        let twenty = snapshot.iter().find(|e| e.statement_id == 20).unwrap();
        assert_eq!(twenty.call_count, 1);
        assert_eq!(twenty.total_time_us, 3000);

        let info = state.info();
        assert_eq!(info.live_count, 2);
        assert_eq!(info.overflow_count, 1);
    }

    #[test]
    fn reset_clears_table_counters_and_events() {
        let state = init(sampled_config(100));
        let recorder = state.recorder();
        recorder.record(1, None, Duration::from_micros(100), &rows(1), CallerId::default());
        assert!(state.events().write(b"reserved"));
        let stamp_before = state.info().last_reset_at;

        thread::sleep(Duration::from_millis(2));
        state.reset();

        let info = state.info();
        assert_eq!(info.live_count, 0);
        assert_eq!(info.total_seen, 0);
        assert!(info.last_reset_at > stamp_before);
        assert!(state.snapshot().is_empty());
        assert!(state.events().is_empty());
    }

    #[test]
    fn recorders_share_one_state() {
        let state = init(sampled_config(100));
        let a = state.recorder();
        let b = a.clone();
        a.record(1, None, Duration::from_micros(10), &rows(1), CallerId::default());
        b.record(2, None, Duration::from_micros(10), &rows(1), CallerId::default());
        assert_eq!(state.info().live_count, 2);
        assert_eq!(state.info().total_seen, 2);
    }

    #[test]
    fn info_serializes_to_json() {
        let state = init(sampled_config(100));
        let json = serde_json::to_string(&state.info()).unwrap();
        assert!(json.contains("\"max_entries\":100"));
        assert!(json.contains("\"version\""));
    }

    #[test]
    fn memory_footprint_scales_with_config() {
        let small = sampled_config(100);
        let large = CollectorConfig {
            max_entries: 10_000,
            buffer_size: 10_485_760,
            ..small.clone()
        };
        assert!(memory_footprint(&large) > memory_footprint(&small));
        assert!(memory_footprint(&small) >= small.buffer_size + 100 * size_of::<Mutex<StatEntry>>());
    }
}
