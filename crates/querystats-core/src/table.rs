//! Fixed-capacity concurrent statistics table.
//!
//! Two-tier locking:
//!
//! ```text
//! structure tier: RwLock<SlotIndex>     field tier: Mutex<StatEntry> per slot
//!   lookup ........ read                  update ......... lock one slot
//!   allocate ...... write                 snapshot copy ... lock one slot at a time
//!   reset ......... write
//! ```
//!
//! The structure tier decides which slot belongs to which statement; the
//! field tier guards one entry's counters. Updates to different statements
//! never contend, and repeat executions of one statement serialize only on
//! that entry's mutex. Lock order is always structure before entry: update
//! paths never touch the structure lock while holding an entry lock, so the
//! paths that take entry locks under the structure lock (allocation, reset,
//! snapshot) cannot deadlock against them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

use crate::util::now_micros;

/// Aggregate statistics for one tracked statement.
///
/// One entry exists per distinct `statement_id` within a table generation.
/// All counters are cumulative since the entry was claimed and only move
/// forward until a full-table reset.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct StatEntry {
    /// Stable hash of the normalized statement text; the table key.
    /// 0 marks an empty slot and is skipped by snapshots.
    pub statement_id: u64,

    /// Fingerprint of the most recently observed plan for this statement.
    /// Overwritten on every update; transitions land in `plan_change_count`.
    pub plan_id: u64,

    /// Number of sampled executions recorded into this entry.
    pub call_count: i64,

    /// Total execution time, microseconds.
    pub total_time_us: i64,

    /// `total_time_us / call_count`, integer division, recomputed on every
    /// update.
    pub mean_time_us: i64,

    /// Rows returned or affected, cumulative.
    pub row_count: i64,

    /// Shared-buffer blocks found in cache, cumulative.
    pub shared_blocks_hit: f64,

    /// Shared-buffer blocks read from disk, cumulative.
    pub shared_blocks_read: f64,

    /// Temporary blocks written, cumulative.
    pub temp_blocks_written: f64,

    /// When this statement was first recorded (microseconds since Unix
    /// epoch). Set once, by the first update after the slot is claimed.
    pub first_seen_at: i64,

    /// When this statement was last recorded (microseconds since Unix epoch).
    pub last_seen_at: i64,

    /// User id of the most recent caller (last writer wins).
    pub owner_user_id: i32,

    /// Database id of the most recent caller (last writer wins).
    pub owner_db_id: i32,

    /// Number of updates whose plan fingerprint differed from the stored
    /// non-zero `plan_id`. A zero fingerprint means "no plan" and never
    /// counts as a change.
    pub plan_change_count: i64,
}

/// One sampled execution's contribution, assembled by the recorder.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatUpdate {
    /// Plan fingerprint observed for this execution (0 = no plan).
    pub plan_id: u64,
    /// Elapsed execution time, microseconds.
    pub elapsed_us: i64,
    pub rows: i64,
    pub shared_blocks_hit: f64,
    pub shared_blocks_read: f64,
    pub temp_blocks_written: f64,
    pub user_id: i32,
    pub db_id: i32,
}

/// Handle to a claimed slot, returned by `find_or_create`.
///
/// Valid until the next reset. Updating through a handle that raced a reset
/// writes into a zeroed slot, which resurrects the statement with a
/// truncated history; tolerated, not prevented (see `update`).
#[derive(Clone, Copy, Debug)]
pub struct EntryHandle {
    slot: usize,
    statement_id: u64,
}

/// Structure tier: which slot belongs to which statement.
#[derive(Default)]
struct SlotIndex {
    /// Number of claimed slots; slots `0..live` are occupied, in claim order.
    live: usize,
    /// statement_id to slot position.
    by_statement: HashMap<u64, usize>,
}

/// Fixed-capacity concurrent map from statement id to aggregate entry.
///
/// Capacity is fixed at construction, slots are claimed in order, and only a
/// full reset releases them. The aggregate counters are relaxed atomics,
/// deliberately loosely consistent with the per-entry data: no ordering is
/// promised between them and any entry's fields.
pub struct StatsTable {
    slots: Box<[Mutex<StatEntry>]>,
    index: RwLock<SlotIndex>,
    total_seen: AtomicI64,
    total_sampled: AtomicI64,
    overflow_count: AtomicI64,
    last_reset_at: AtomicI64,
}

impl StatsTable {
    /// Creates a table with `max_entries` pre-allocated zeroed slots.
    pub fn new(max_entries: usize) -> Self {
        let slots = (0..max_entries)
            .map(|_| Mutex::new(StatEntry::default()))
            .collect();
        Self {
            slots,
            index: RwLock::new(SlotIndex::default()),
            total_seen: AtomicI64::new(0),
            total_sampled: AtomicI64::new(0),
            overflow_count: AtomicI64::new(0),
            last_reset_at: AtomicI64::new(now_micros()),
        }
    }

    /// Slot count, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of claimed slots.
    pub fn live_count(&self) -> usize {
        self.read_index().live
    }

    /// Executions committed through `update` since the last reset.
    pub fn total_seen(&self) -> i64 {
        self.total_seen.load(Ordering::Relaxed)
    }

    /// Executions that passed the sampling gate since the last reset.
    pub fn total_sampled(&self) -> i64 {
        self.total_sampled.load(Ordering::Relaxed)
    }

    /// New-statement drops against a full table since the last reset.
    pub fn overflow_count(&self) -> i64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// When this table was created or last reset (microseconds since Unix
    /// epoch).
    pub fn last_reset_at(&self) -> i64 {
        self.last_reset_at.load(Ordering::Relaxed)
    }

    /// Finds the slot for `statement_id`, claiming the next free one for a
    /// previously unseen statement. Returns `None` when the table is full;
    /// callers count that as an overflow drop.
    ///
    /// The structure lock is held only for the lookup or allocation, never
    /// while statistic fields are written, so the common path (an already
    /// tracked statement) costs one shared read-lock acquisition.
    pub fn find_or_create(&self, statement_id: u64) -> Option<EntryHandle> {
        if let Some(&slot) = self.read_index().by_statement.get(&statement_id) {
            return Some(EntryHandle { slot, statement_id });
        }

        let mut index = self.write_index();
        // Racing allocators: re-check under the write lock.
        if let Some(&slot) = index.by_statement.get(&statement_id) {
            return Some(EntryHandle { slot, statement_id });
        }
        if index.live >= self.capacity() {
            return None;
        }
        let slot = index.live;
        index.live += 1;
        index.by_statement.insert(statement_id, slot);
        *self.lock_slot(slot) = StatEntry {
            statement_id,
            ..StatEntry::default()
        };
        Some(EntryHandle { slot, statement_id })
    }

    /// Applies one execution's statistics under the entry's own lock.
    ///
    /// The statement id is rewritten on every update so an update racing a
    /// reset leaves the slot self-consistent: the statement reappears with a
    /// truncated history instead of half-cleared fields keyed to nothing.
    pub fn update(&self, handle: EntryHandle, update: &StatUpdate) {
        let now = now_micros();
        let mut entry = self.lock_slot(handle.slot);
        entry.statement_id = handle.statement_id;
        // A change needs a plan on both sides; a zero fingerprint is "no
        // plan", not a plan of its own.
        if entry.plan_id != 0 && update.plan_id != 0 && entry.plan_id != update.plan_id {
            entry.plan_change_count += 1;
        }
        entry.plan_id = update.plan_id;
        entry.call_count += 1;
        entry.total_time_us += update.elapsed_us;
        entry.mean_time_us = entry.total_time_us / entry.call_count;
        entry.row_count += update.rows;
        entry.shared_blocks_hit += update.shared_blocks_hit;
        entry.shared_blocks_read += update.shared_blocks_read;
        entry.temp_blocks_written += update.temp_blocks_written;
        entry.last_seen_at = now;
        if entry.first_seen_at == 0 {
            entry.first_seen_at = entry.last_seen_at;
        }
        entry.owner_user_id = update.user_id;
        entry.owner_db_id = update.db_id;
    }

    /// Bumps the seen/sampled counters for a committed execution. Called
    /// after `update`, outside any lock.
    pub fn note_recorded(&self) {
        self.total_seen.fetch_add(1, Ordering::Relaxed);
        self.total_sampled.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a new-statement drop against a full table. The first drop of
    /// a generation is logged; after that only the counter moves.
    pub fn note_overflow(&self) {
        if self.overflow_count.fetch_add(1, Ordering::Relaxed) == 0 {
            warn!(
                capacity = self.capacity(),
                "statement table full, dropping new statements"
            );
        }
    }

    /// Copies every live entry, in slot claim order.
    ///
    /// The structure lock is held in read mode for the whole pass and each
    /// entry is copied under its own lock, so every returned entry is
    /// internally consistent; the set as a whole is still a moving target
    /// while recorders are active.
    pub fn snapshot(&self) -> Vec<StatEntry> {
        let index = self.read_index();
        let mut out = Vec::with_capacity(index.live);
        for slot in 0..index.live {
            let entry = self.lock_slot(slot);
            if entry.statement_id != 0 {
                out.push(entry.clone());
            }
        }
        out
    }

    /// Clears every slot (claimed or not, so ghost data cannot resurface
    /// when a slot is reclaimed), the index, and the aggregate counters,
    /// then stamps the reset time. Idempotent.
    pub fn reset(&self) {
        let mut index = self.write_index();
        for slot in 0..self.capacity() {
            *self.lock_slot(slot) = StatEntry::default();
        }
        index.live = 0;
        index.by_statement.clear();
        self.total_seen.store(0, Ordering::Relaxed);
        self.total_sampled.store(0, Ordering::Relaxed);
        self.overflow_count.store(0, Ordering::Relaxed);
        self.last_reset_at.store(now_micros(), Ordering::Relaxed);
    }

    // Telemetry must never panic the host. A poisoned lock only means some
    // writer panicked mid-update, and everything guarded here is a plain
    // counter or id, so the lock is recovered and the possibly torn entry
    // tolerated.
    fn lock_slot(&self, slot: usize) -> MutexGuard<'_, StatEntry> {
        self.slots[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_index(&self) -> RwLockReadGuard<'_, SlotIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, SlotIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Derives the table key for a normalized statement text.
///
/// For hosts that do not already carry a stable statement hash. 0 marks an
/// empty slot, so the one-in-2^64 zero hash is remapped to a fixed non-zero
/// value.
pub fn statement_id(text: &str) -> u64 {
    match xxh3_64(text.as_bytes()) {
        0 => 0x9E37_79B9_7F4A_7C15,
        id => id,
    }
}
