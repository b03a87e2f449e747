//! Result/error vocabulary shared by the sync engines, adapters, and drivers.
//!
//! `SyncAction` is the state-machine's return value, not an error: gaps are
//! data the driver reacts to (§7), never a panic or an `Err`. `CoreError` is
//! the conventional `thiserror` enum for genuine failures (parse errors, I/O,
//! tick misalignment) that the driver layer catches and logs rather than
//! propagating into the sync engine.

use thiserror::Error;

/// Why a sync engine transitioned to `Gap`. Mirrors the kinds enumerated in
/// spec §7; `BridgeImpossible`, `ChecksumMismatch`, and `BufferOverflow` are
/// all reported as a tagged `Gap` rather than distinct top-level actions, so
/// a driver that only matches on `SyncAction::Gap` still behaves correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapReason {
    /// `u <= last_update_id` would be Stale, not Gap; this is the inverse:
    /// the diff starts after the book's horizon with no way to bridge.
    SequenceGap { expected_after: u64, got_u: u64 },
    /// Earliest buffered `U` is already past `last_update_id + 1`; no buffered
    /// event can ever bridge this snapshot.
    BridgeImpossible { min_u_start: u64, last_update_id: u64 },
    /// Pre-sync buffer exceeded its configured cap; buffer was cleared.
    BufferOverflow { cap: usize },
    /// Locally computed checksum did not match the exchange-supplied one.
    ChecksumMismatch { expected: u32, computed: u32 },
    /// A structural problem (e.g. missing `last_update_id`) rather than a
    /// sequencing problem.
    Invalid(String),
}

impl std::fmt::Display for GapReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapReason::SequenceGap { expected_after, got_u } => {
                write!(f, "gap U>{expected_after} got u={got_u}")
            }
            GapReason::BridgeImpossible { min_u_start, last_update_id } => {
                write!(f, "bridge_impossible min_U={min_u_start} lastUpdateId={last_update_id}")
            }
            GapReason::BufferOverflow { cap } => write!(f, "buffer_overflow cap={cap}"),
            GapReason::ChecksumMismatch { expected, computed } => {
                write!(f, "checksum_mismatch expected={expected} got={computed}")
            }
            GapReason::Invalid(msg) => write!(f, "invalid: {msg}"),
        }
    }
}

/// Outcome of feeding one event to a `SyncEngine`. See spec §4.1/§4.2/§4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Diff accepted and applied to an already-synced book.
    Applied,
    /// Diff pre-dates the book's current horizon; ignored, book unchanged.
    Stale,
    /// Diff buffered because no snapshot has been adopted yet (or the book
    /// has a snapshot but hasn't found its bridge point yet).
    Buffered,
    /// This diff was the one that completed the bridge/adoption; book is now synced.
    Synced,
    /// Book is invalid; caller must resync. Carries the reason for logging.
    Gap(GapReason),
}

impl SyncAction {
    pub fn is_gap(&self) -> bool {
        matches!(self, SyncAction::Gap(_))
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("price {price} is not aligned to tick size {tick_size} (tolerance {tolerance})")]
    TickAlignment { price: f64, tick_size: f64, tolerance: f64 },

    #[error("snapshot is missing last_update_id; cannot sync")]
    MissingLastUpdateId,

    #[error("failed to parse wire frame: {0}")]
    ParseError(String),

    #[error("snapshot fetch failed: {0}")]
    SnapshotFetchFailed(String),

    #[error("recording window has already expired")]
    WindowExpired,

    #[error("fatal: {0}")]
    Fatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
