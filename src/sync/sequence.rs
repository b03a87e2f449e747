//! Sequence-bridging sync engine (Binance-style), grounded on
//! `mm_core/sync_engine.py::OrderBookSyncEngine`.
//!
//! A REST snapshot carries a `lastUpdateId` horizon; the live diff stream is
//! buffered until a diff whose range straddles that horizon (`U <= lu+1 <=
//! u`) is found, at which point the book is bridged and subsequent diffs
//! apply directly.

use super::SyncEngine;
use crate::error::{CoreError, GapReason, SyncAction};
use crate::model::{BookSnapshot, DepthDiff, LocalOrderBook};

pub struct SequenceBridgeEngine {
    lob: LocalOrderBook,
    buffer: Vec<DepthDiff>,
    max_buffer_size: usize,
    snapshot_loaded: bool,
    depth_synced: bool,
    last_recv_seq: Option<u64>,
    tick_size: Option<f64>,
}

impl SequenceBridgeEngine {
    pub fn new(max_buffer_size: usize, tick_size: Option<f64>) -> Self {
        Self {
            lob: LocalOrderBook::new(tick_size),
            buffer: Vec::new(),
            max_buffer_size,
            snapshot_loaded: false,
            depth_synced: false,
            last_recv_seq: None,
            tick_size,
        }
    }

    fn push_buffered(&mut self, diff: DepthDiff) -> Option<SyncAction> {
        self.buffer.push(diff);
        if self.buffer.len() > self.max_buffer_size {
            self.buffer.clear();
            return Some(SyncAction::Gap(GapReason::BufferOverflow { cap: self.max_buffer_size }));
        }
        None
    }

    /// Replays the sorted buffer against the adopted snapshot, looking for
    /// the bridge diff. Mirrors `_try_initial_sync`: stale entries (`u <=
    /// last_update_id`) are discarded outright; the first diff whose range
    /// straddles `last_update_id + 1` bridges the book; everything after
    /// that, still in buffer order, applies directly.
    fn try_initial_sync(&mut self) -> Result<SyncAction, CoreError> {
        if self.buffer.is_empty() {
            return Ok(SyncAction::Buffered);
        }
        self.buffer.sort_by_key(|d| d.u_start);

        let Some(lu) = self.lob.last_update_id else {
            return Ok(SyncAction::Gap(GapReason::Invalid("no last_update_id".into())));
        };
        let min_u_start = self.buffer[0].u_start;
        if min_u_start > lu + 1 {
            // Buffer retained: a later snapshot may still bridge these.
            return Ok(SyncAction::Gap(GapReason::BridgeImpossible { min_u_start, last_update_id: lu }));
        }

        let pending = std::mem::take(&mut self.buffer);
        let mut bridged = false;
        let mut remaining = Vec::new();
        let mut gap: Option<GapReason> = None;

        for ev in pending {
            if gap.is_some() {
                break;
            }
            let lu_now = self.lob.last_update_id.unwrap();
            if ev.u_end <= lu_now {
                continue; // stale, discard
            }
            if !self.depth_synced {
                if ev.u_start <= lu_now + 1 && lu_now + 1 <= ev.u_end {
                    match self.lob.apply_diff(ev.u_start, ev.u_end, &ev.bids, &ev.asks)? {
                        SyncAction::Gap(g) => gap = Some(g),
                        _ => {
                            self.depth_synced = true;
                            bridged = true;
                        }
                    }
                } else {
                    remaining.push(ev);
                }
            } else if let SyncAction::Gap(g) = self.lob.apply_diff(ev.u_start, ev.u_end, &ev.bids, &ev.asks)? {
                gap = Some(g);
            }
        }

        if let Some(g) = gap {
            self.buffer.clear();
            return Ok(SyncAction::Gap(g));
        }

        if self.depth_synced {
            self.buffer.clear();
            Ok(if bridged { SyncAction::Synced } else { SyncAction::Applied })
        } else {
            self.buffer = remaining;
            Ok(SyncAction::Buffered)
        }
    }
}

impl SyncEngine for SequenceBridgeEngine {
    fn feed(&mut self, diff: DepthDiff) -> Result<SyncAction, CoreError> {
        if !self.snapshot_loaded {
            if let Some(gap) = self.push_buffered(diff) {
                return Ok(gap);
            }
            return Ok(SyncAction::Buffered);
        }
        if !self.depth_synced {
            if let Some(gap) = self.push_buffered(diff) {
                return Ok(gap);
            }
            return self.try_initial_sync();
        }
        self.lob.apply_diff(diff.u_start, diff.u_end, &diff.bids, &diff.asks)
    }

    fn adopt_snapshot(&mut self, snapshot: BookSnapshot) -> Result<(), CoreError> {
        let last_update_id = snapshot.last_update_id.ok_or(CoreError::MissingLastUpdateId)?;
        self.lob.load_snapshot(&snapshot.bids, &snapshot.asks, last_update_id)?;
        self.snapshot_loaded = true;
        self.depth_synced = false;
        Ok(())
    }

    fn reset_for_resync(&mut self) {
        self.lob = LocalOrderBook::new(self.tick_size);
        self.buffer.clear();
        self.snapshot_loaded = false;
        self.depth_synced = false;
    }

    fn lob(&self) -> &LocalOrderBook {
        &self.lob
    }
    fn snapshot_loaded(&self) -> bool {
        self.snapshot_loaded
    }
    fn depth_synced(&self) -> bool {
        self.depth_synced
    }
    fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
    fn set_last_recv_seq(&mut self, seq: u64) {
        self.last_recv_seq = Some(seq);
    }
    fn last_recv_seq(&self) -> Option<u64> {
        self.last_recv_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvl(p: &str, q: &str) -> (String, String) {
        (p.to_string(), q.to_string())
    }

    fn snap(last_update_id: u64) -> BookSnapshot {
        let mut s = BookSnapshot::new(vec![lvl("100", "1")], vec![lvl("101", "1")]);
        s.last_update_id = Some(last_update_id);
        s
    }

    /// S1: diffs buffered pre-snapshot, snapshot adopted, a straddling diff bridges.
    #[test]
    fn s1_buffers_before_snapshot_then_bridges_on_adopt() {
        let mut engine = SequenceBridgeEngine::new(1000, None);
        assert_eq!(engine.feed(DepthDiff::new(0, 8, 9, vec![], vec![])).unwrap(), SyncAction::Buffered);
        assert_eq!(engine.feed(DepthDiff::new(0, 10, 12, vec![], vec![])).unwrap(), SyncAction::Buffered);
        assert_eq!(engine.buffer_len(), 2);

        engine.adopt_snapshot(snap(10)).unwrap();
        assert!(!engine.depth_synced());

        let action = engine.feed(DepthDiff::new(0, 13, 13, vec![], vec![])).unwrap();
        assert_eq!(action, SyncAction::Synced);
        assert!(engine.depth_synced());
        assert_eq!(engine.lob().last_update_id, Some(13));
        assert_eq!(engine.buffer_len(), 0);
    }

    /// S2: buffered diffs strictly before the snapshot horizon are discarded, not applied.
    #[test]
    fn s2_stale_buffered_diffs_are_discarded_not_applied() {
        let mut engine = SequenceBridgeEngine::new(1000, None);
        engine.feed(DepthDiff::new(0, 1, 5, vec![lvl("999", "9")], vec![])).unwrap();
        engine.feed(DepthDiff::new(0, 10, 11, vec![], vec![])).unwrap();

        engine.adopt_snapshot(snap(10)).unwrap();
        let action = engine.feed(DepthDiff::new(0, 12, 12, vec![], vec![])).unwrap();
        assert_eq!(action, SyncAction::Synced);
        // the stale U=1..5 diff must never have touched the book
        assert!(engine.lob().top_n(5).0.iter().all(|(p, _)| *p != 999.0));
    }

    /// S3: the buffered window never reaches the snapshot horizon -> bridge_impossible.
    #[test]
    fn s3_gap_when_buffer_cannot_bridge_snapshot() {
        let mut engine = SequenceBridgeEngine::new(1000, None);
        engine.adopt_snapshot(snap(10)).unwrap();
        let action = engine.feed(DepthDiff::new(0, 50, 51, vec![], vec![])).unwrap();
        assert!(matches!(action, SyncAction::Gap(GapReason::BridgeImpossible { .. })));
    }

    #[test]
    fn buffer_overflow_clears_buffer_and_reports_gap() {
        let mut engine = SequenceBridgeEngine::new(2, None);
        assert_eq!(engine.feed(DepthDiff::new(0, 1, 1, vec![], vec![])).unwrap(), SyncAction::Buffered);
        assert_eq!(engine.feed(DepthDiff::new(0, 2, 2, vec![], vec![])).unwrap(), SyncAction::Buffered);
        let action = engine.feed(DepthDiff::new(0, 3, 3, vec![], vec![])).unwrap();
        assert!(matches!(action, SyncAction::Gap(GapReason::BufferOverflow { .. })));
        assert_eq!(engine.buffer_len(), 0);
    }

    #[test]
    fn feed_applies_directly_once_synced() {
        let mut engine = SequenceBridgeEngine::new(1000, None);
        engine.adopt_snapshot(snap(10)).unwrap();
        engine.feed(DepthDiff::new(0, 11, 11, vec![], vec![])).unwrap();
        assert!(engine.depth_synced());
        let action = engine.feed(DepthDiff::new(0, 12, 12, vec![lvl("105", "2")], vec![])).unwrap();
        assert_eq!(action, SyncAction::Applied);
        assert_eq!(engine.lob().best_bid(), Some(105.0));
    }

    #[test]
    fn reset_for_resync_clears_everything() {
        let mut engine = SequenceBridgeEngine::new(1000, None);
        engine.adopt_snapshot(snap(10)).unwrap();
        engine.feed(DepthDiff::new(0, 11, 11, vec![], vec![])).unwrap();
        engine.reset_for_resync();
        assert!(!engine.snapshot_loaded());
        assert!(!engine.depth_synced());
        assert_eq!(engine.buffer_len(), 0);
        assert!(engine.lob().is_empty());
    }
}
