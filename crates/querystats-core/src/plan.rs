//! Plan descriptors and change-detection fingerprints.
//!
//! A fingerprint is a signal that a statement's plan shape changed, not a
//! content hash: two structurally different plans may collide, but a changed
//! fingerprint always means the shape changed. The statistics table stores
//! the latest fingerprint per statement and counts transitions.

use serde::{Deserialize, Serialize};

/// Bits reserved per packed fingerprint field.
const FIELD_BITS: u32 = 16;
const FIELD_MASK: u64 = 0xFFFF;

/// Top-level operation kind of an execution plan.
///
/// Discriminants are stable: they are visible through the fingerprint's
/// high-order field and must not be reordered.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum CommandKind {
    #[default]
    Select = 1,
    Update = 2,
    Insert = 3,
    Delete = 4,
    Merge = 5,
    /// DDL and other non-DML statements.
    Utility = 6,
}

impl CommandKind {
    /// Lowercase label for report lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Update => "update",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Merge => "merge",
            Self::Utility => "utility",
        }
    }
}

/// Shape summary of one execution plan, supplied by the host.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct PlanDescriptor {
    /// Top-level operation kind.
    pub kind: CommandKind,

    /// Whether the plan returns rows to its caller (e.g. a RETURNING clause
    /// on a modifying statement).
    pub returns_rows: bool,

    /// Whether the plan contains a data-modifying nested query.
    pub has_modifying_cte: bool,

    /// Number of range-table entries (relations scanned or referenced).
    pub range_table_count: u32,
}

/// Packs a plan descriptor into a 64-bit fingerprint.
///
/// Four 16-bit fields, command kind in the high-order position, each masked
/// to its width so a large range table can never bleed into a neighboring
/// field. `None` (no plan available) yields 0, which the table treats as
/// "absent" and never counts as a plan change.
pub fn fingerprint(plan: Option<&PlanDescriptor>) -> u64 {
    let Some(plan) = plan else {
        return 0;
    };
    let mut hash = plan.kind as u64 & FIELD_MASK;
    hash = (hash << FIELD_BITS) | u64::from(plan.returns_rows);
    hash = (hash << FIELD_BITS) | u64::from(plan.has_modifying_cte);
    hash = (hash << FIELD_BITS) | (u64::from(plan.range_table_count) & FIELD_MASK);
    hash
}
