//! I/O-free sync engines (spec §4.2/§4.3): the `SyncEngine` trait plus two
//! concrete implementations selected by `ExchangeAdapter::sync_mode`.
//!
//! Per spec §9 ("inheritance of engines -> trait/interface"): drivers
//! (recorder, replayer) depend only on this trait, never on a concrete engine.

pub mod bitfinex;
pub mod capped_book;
pub mod kraken;
pub mod sequence;

use crate::error::{CoreError, SyncAction};
use crate::model::{BookSnapshot, DepthDiff, LocalOrderBook};

/// Which synchronization discipline an exchange uses (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Sequence,
    Checksum,
}

/// Shared interface implemented by `sequence::SequenceBridgeEngine`,
/// `kraken::KrakenSyncEngine`, and `bitfinex::BitfinexSyncEngine`.
pub trait SyncEngine {
    /// Feed one normalized depth diff; returns the state-machine transition.
    fn feed(&mut self, diff: DepthDiff) -> Result<SyncAction, CoreError>;

    /// Adopt a freshly-fetched snapshot. Resets `depth_synced` but — for the
    /// sequence engine — retains buffered diffs, since they may bridge the
    /// new snapshot (spec §4.2).
    fn adopt_snapshot(&mut self, snapshot: BookSnapshot) -> Result<(), CoreError>;

    /// Clear book, buffer, and flags for a full resync (spec §4.2/§4.3).
    fn reset_for_resync(&mut self);

    /// The reconstructed book, for `top_n` queries by the recorder/replayer.
    fn lob(&self) -> &LocalOrderBook;

    fn snapshot_loaded(&self) -> bool;
    fn depth_synced(&self) -> bool;
    fn buffer_len(&self) -> usize;

    /// Updated by the replayer before each `feed` call to carry global
    /// ordering through to engine-internal bookkeeping (spec §4.6).
    fn set_last_recv_seq(&mut self, seq: u64);
    fn last_recv_seq(&self) -> Option<u64>;
}
