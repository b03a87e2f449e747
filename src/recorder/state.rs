//! `RecorderState`/`RecorderPhase`: the driver's in-memory state machine,
//! grounded on `mm_recorder/recorder_types.py`.

use std::fmt;

/// `CONNECTING → SNAPSHOT → SYNCING → SYNCED ↔ RESYNCING → STOPPED` (spec §4.5).
/// Every transition is also durably recorded as a `state_change` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Connecting,
    Snapshot,
    Syncing,
    Synced,
    Resyncing,
    Stopped,
}

impl RecorderPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderPhase::Connecting => "connecting",
            RecorderPhase::Snapshot => "snapshot",
            RecorderPhase::Syncing => "syncing",
            RecorderPhase::Synced => "synced",
            RecorderPhase::Resyncing => "resyncing",
            RecorderPhase::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RecorderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable run state threaded through the driver loop. `recv_seq` and
/// `event_id` are the two process-owned monotone counters (spec §4.5/§9 —
/// "global counters -> owned atomics", though a single-threaded loop needs
/// only a plain field, not an actual `AtomicU64`).
#[derive(Debug, Clone)]
pub struct RecorderState {
    pub recv_seq: u64,
    pub event_id: u64,
    pub epoch_id: u64,
    pub resync_count: u64,
    pub ws_open_count: u64,
    pub window_end_emitted: bool,
    pub last_hb_ms: i64,
    pub sync_t0_ms: i64,
    pub last_sync_warn_ms: i64,
    pub depth_msg_count: u64,
    pub trade_msg_count: u64,
    pub ob_rows_written: u64,
    pub tr_rows_written: u64,
    pub last_depth_event_ms: Option<i64>,
    pub last_trade_event_ms: Option<i64>,
    pub needs_snapshot: bool,
    pub pending_snapshot_tag: Option<String>,
    pub phase: RecorderPhase,
    pub last_ws_msg_time_ms: Option<i64>,
    pub last_no_data_warn_ms: i64,
    pub first_data_emitted: bool,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self {
            recv_seq: 0,
            event_id: 0,
            epoch_id: 0,
            resync_count: 0,
            ws_open_count: 0,
            window_end_emitted: false,
            last_hb_ms: 0,
            sync_t0_ms: 0,
            last_sync_warn_ms: 0,
            depth_msg_count: 0,
            trade_msg_count: 0,
            ob_rows_written: 0,
            tr_rows_written: 0,
            last_depth_event_ms: None,
            last_trade_event_ms: None,
            needs_snapshot: false,
            pending_snapshot_tag: None,
            phase: RecorderPhase::Connecting,
            last_ws_msg_time_ms: None,
            last_no_data_warn_ms: 0,
            first_data_emitted: false,
        }
    }
}

impl RecorderState {
    /// Issues the next `recv_seq`, the single counter shared by every
    /// written record across every file (spec §4.5 "global ordering
    /// invariant" / invariant 2 in §8).
    pub fn next_recv_seq(&mut self) -> u64 {
        let seq = self.recv_seq;
        self.recv_seq += 1;
        seq
    }

    pub fn next_event_id(&mut self) -> u64 {
        let id = self.event_id;
        self.event_id += 1;
        id
    }

    /// Enter `Resyncing`, bump `epoch_id`, and mint a unique resync tag so
    /// snapshot filenames never collide across back-to-back gaps (spec §4.5
    /// "resync idempotence").
    pub fn begin_resync(&mut self) -> String {
        self.resync_count += 1;
        self.phase = RecorderPhase::Resyncing;
        let tag = format!("resync_{:06}", self.resync_count);
        self.pending_snapshot_tag = Some(tag.clone());
        self.needs_snapshot = true;
        tag
    }

    /// `Synced` transition after a successful resync increments `epoch_id`
    /// by exactly 1 (§8 invariant 5); the very first sync also counts.
    pub fn mark_synced(&mut self) {
        self.epoch_id += 1;
        self.phase = RecorderPhase::Synced;
        self.needs_snapshot = false;
        self.pending_snapshot_tag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_seq_and_event_id_are_independent_monotone_counters() {
        let mut s = RecorderState::default();
        assert_eq!(s.next_recv_seq(), 0);
        assert_eq!(s.next_recv_seq(), 1);
        assert_eq!(s.next_event_id(), 0);
        assert_eq!(s.next_recv_seq(), 2);
    }

    #[test]
    fn begin_resync_then_mark_synced_increments_epoch_once() {
        let mut s = RecorderState::default();
        s.mark_synced();
        assert_eq!(s.epoch_id, 1);
        let tag = s.begin_resync();
        assert_eq!(tag, "resync_000001");
        assert_eq!(s.phase, RecorderPhase::Resyncing);
        s.mark_synced();
        assert_eq!(s.epoch_id, 2);
        assert!(s.pending_snapshot_tag.is_none());
    }
}
