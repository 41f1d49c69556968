//! Recording path from the host's execution hooks into the table.
//!
//! Two integration shapes:
//! - `record` for hosts with a single completion callback,
//! - `start_execution`/`finish_execution` for hosts with separate start and
//!   finish hooks; the sampling decision is made once, at the start.
//!
//! A skipped execution (disabled, unsampled, or table full) is lost
//! telemetry, never an error: nothing on this path fails into the host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::plan::{self, PlanDescriptor};
use crate::sampler;
use crate::state::CollectorState;
use crate::table::StatUpdate;

/// Post-execution counters supplied by the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecutionCounters {
    /// Rows returned or affected by this execution.
    pub rows: i64,
    /// Shared-buffer blocks found in cache.
    pub shared_blocks_hit: f64,
    /// Shared-buffer blocks read from disk.
    pub shared_blocks_read: f64,
    /// Temporary blocks written.
    pub temp_blocks_written: f64,
}

/// Identity of the caller on whose behalf the statement ran.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallerId {
    pub user_id: i32,
    pub db_id: i32,
}

/// Start-of-execution capture returned by `Recorder::start_execution`.
///
/// Owning one means the execution passed the enabled and sampling gates;
/// hand it back to `finish_execution` to commit the elapsed time.
#[derive(Debug)]
pub struct ExecutionTimer {
    started: Instant,
}

impl ExecutionTimer {
    fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Time since the execution started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Write-side handle onto a shared collector.
///
/// Cloning is an `Arc` bump; each execution context (worker thread,
/// connection handler) holds its own.
#[derive(Clone)]
pub struct Recorder {
    state: Arc<CollectorState>,
}

impl Recorder {
    pub(crate) fn new(state: Arc<CollectorState>) -> Self {
        Self { state }
    }

    /// One-shot form: gate, fingerprint, and commit a completed execution.
    pub fn record(
        &self,
        statement_id: u64,
        plan: Option<&PlanDescriptor>,
        elapsed: Duration,
        counters: &ExecutionCounters,
        caller: CallerId,
    ) {
        if !self.gate() {
            return;
        }
        self.commit(statement_id, plan, elapsed, counters, caller);
    }

    /// Start-hook form: applies the enabled and sampling gates once and
    /// captures the start instant. `None` means this execution is skipped.
    pub fn start_execution(&self) -> Option<ExecutionTimer> {
        self.gate().then(ExecutionTimer::start)
    }

    /// Finish-hook form: commits an execution admitted by `start_execution`,
    /// without a second sampling decision.
    pub fn finish_execution(
        &self,
        timer: ExecutionTimer,
        statement_id: u64,
        plan: Option<&PlanDescriptor>,
        counters: &ExecutionCounters,
        caller: CallerId,
    ) {
        self.commit(statement_id, plan, timer.elapsed(), counters, caller);
    }

    fn gate(&self) -> bool {
        let config = self.state.config();
        config.enabled && sampler::should_sample(config.sample_rate_percent)
    }

    fn commit(
        &self,
        statement_id: u64,
        plan: Option<&PlanDescriptor>,
        elapsed: Duration,
        counters: &ExecutionCounters,
        caller: CallerId,
    ) {
        let table = self.state.table();
        let Some(handle) = table.find_or_create(statement_id) else {
            table.note_overflow();
            return;
        };
        table.update(
            handle,
            &StatUpdate {
                plan_id: plan::fingerprint(plan),
                elapsed_us: elapsed.as_micros().min(i64::MAX as u128) as i64,
                rows: counters.rows,
                shared_blocks_hit: counters.shared_blocks_hit,
                shared_blocks_read: counters.shared_blocks_read,
                temp_blocks_written: counters.temp_blocks_written,
                user_id: caller.user_id,
                db_id: caller.db_id,
            },
        );
        // Aggregate bumps come after the entry update, outside its lock.
        table.note_recorded();
    }
}
