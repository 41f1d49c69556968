//! querystats-core — in-process statement statistics for query engines.
//!
//! Aggregates per-statement execution telemetry (timing, rows, buffer usage)
//! inside the host process, in a fixed-capacity concurrent table that stays
//! readable without a round trip through the engine's query path.
//!
//! Provides:
//! - `config` — capacity and sampling parameters, validation
//! - `sampler` — percentage sampling gate
//! - `plan` — plan descriptors and change-detection fingerprints
//! - `table` — the fixed-capacity concurrent statistics table
//! - `ring` — reserved event ring buffer
//! - `recorder` — the write path from the host's execution hooks
//! - `state` — shared state, lifecycle, and the snapshot/reset/info surface
//! - `util` — helper utilities
//!
//! Typical embedding:
//!
//! ```
//! use std::time::Duration;
//! use querystats_core::{CallerId, CollectorConfig, ExecutionCounters, init, statement_id};
//!
//! let state = init(CollectorConfig::default());
//! let recorder = state.recorder();
//! recorder.record(
//!     statement_id("SELECT * FROM users WHERE id = $1"),
//!     None,
//!     Duration::from_micros(1500),
//!     &ExecutionCounters { rows: 1, ..ExecutionCounters::default() },
//!     CallerId { user_id: 10, db_id: 1 },
//! );
//! assert_eq!(state.snapshot().len(), 1);
//! ```

pub mod config;
pub mod plan;
pub mod recorder;
pub mod ring;
pub mod sampler;
pub mod state;
pub mod table;
pub mod util;

pub use config::{CollectorConfig, ConfigError};
pub use plan::{CommandKind, PlanDescriptor, fingerprint};
pub use recorder::{CallerId, ExecutionCounters, ExecutionTimer, Recorder};
pub use ring::EventRingBuffer;
pub use state::{CollectorInfo, CollectorState, init, memory_footprint};
pub use table::{StatEntry, StatsTable, statement_id};
