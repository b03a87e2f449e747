//! Checksum-verifying sync engine for Bitfinex, grounded on
//! `mm_core/checksum/bitfinex.py::BitfinexSyncEngine`.
//!
//! Same depth-capped/snapshot-is-instantly-synced shape as Kraken, but the
//! checksum is bids-then-asks, colon-joined, over signed quantity strings
//! (ask amounts stay negative). The exchange's own checksum is a signed
//! int32; `adapter::bitfinex` normalizes it to the same unsigned bit pattern
//! `checksum()` produces before it ever reaches a `DepthDiff`.

use super::capped_book::CappedBook;
use super::SyncEngine;
use crate::error::{CoreError, GapReason, SyncAction};
use crate::model::{BookSnapshot, DepthDiff, LocalOrderBook};

/// Bitfinex book channel is always 25 levels (`adapter::bitfinex::normalize_depth`).
const CHECKSUM_DEPTH: usize = 25;

pub struct BitfinexSyncEngine {
    book: CappedBook,
    lob: LocalOrderBook,
    buffer: Vec<DepthDiff>,
    max_buffer_size: usize,
    snapshot_loaded: bool,
    depth_synced: bool,
    last_recv_seq: Option<u64>,
}

impl BitfinexSyncEngine {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            book: CappedBook::new(CHECKSUM_DEPTH),
            lob: LocalOrderBook::default(),
            buffer: Vec::new(),
            max_buffer_size,
            snapshot_loaded: false,
            depth_synced: false,
            last_recv_seq: None,
        }
    }

    fn project(&mut self) {
        let (bids, asks) = self.book.top_n(CHECKSUM_DEPTH);
        self.lob.replace_levels(bids, asks);
    }

    fn checksum(&self) -> u32 {
        let mut parts: Vec<&str> = Vec::new();
        for (_, lvl) in self.book.bids.iter().take(CHECKSUM_DEPTH) {
            parts.push(&lvl.price_str);
            parts.push(&lvl.qty_str);
        }
        for (_, lvl) in self.book.asks.iter().take(CHECKSUM_DEPTH) {
            parts.push(&lvl.price_str);
            parts.push(&lvl.qty_str);
        }
        crc32fast::hash(parts.join(":").as_bytes())
    }

    fn apply_levels(&mut self, diff: &DepthDiff) -> Result<(), CoreError> {
        for (p, q) in &diff.bids {
            self.book.upsert(p, q, true)?;
        }
        for (p, q) in &diff.asks {
            self.book.upsert(p, q, false)?;
        }
        Ok(())
    }
}

impl SyncEngine for BitfinexSyncEngine {
    fn feed(&mut self, diff: DepthDiff) -> Result<SyncAction, CoreError> {
        if !self.snapshot_loaded {
            self.buffer.push(diff);
            if self.buffer.len() > self.max_buffer_size {
                self.buffer.clear();
                return Ok(SyncAction::Gap(GapReason::BufferOverflow { cap: self.max_buffer_size }));
            }
            return Ok(SyncAction::Buffered);
        }

        let expected = diff.checksum;
        self.apply_levels(&diff)?;
        self.project();

        if let Some(expected) = expected {
            let computed = self.checksum();
            if computed != expected {
                return Ok(SyncAction::Gap(GapReason::ChecksumMismatch { expected, computed }));
            }
        }
        Ok(SyncAction::Applied)
    }

    fn adopt_snapshot(&mut self, snapshot: BookSnapshot) -> Result<(), CoreError> {
        self.book.clear();
        for (p, q) in &snapshot.bids {
            self.book.upsert(p, q, true)?;
        }
        for (p, q) in &snapshot.asks {
            self.book.upsert(p, q, false)?;
        }
        self.snapshot_loaded = true;
        self.depth_synced = true;
        self.project();

        let pending = std::mem::take(&mut self.buffer);
        for diff in pending {
            self.apply_levels(&diff)?;
        }
        self.project();
        Ok(())
    }

    fn reset_for_resync(&mut self) {
        self.book.clear();
        self.buffer.clear();
        self.lob = LocalOrderBook::default();
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

    #[test]
    fn adopts_snapshot_and_matches_recomputed_checksum() {
        let mut engine = BitfinexSyncEngine::new(1000);
        let snapshot = BookSnapshot::new(vec![lvl("100.0", "1.5")], vec![lvl("100.5", "-2.0")]);
        engine.adopt_snapshot(snapshot).unwrap();
        let expected = engine.checksum();
        let diff = DepthDiff { checksum: Some(expected), ..DepthDiff::new(0, 0, 0, vec![], vec![]) };
        assert_eq!(engine.feed(diff).unwrap(), SyncAction::Applied);
    }

    #[test]
    fn checksum_mismatch_is_a_gap() {
        let mut engine = BitfinexSyncEngine::new(1000);
        engine
            .adopt_snapshot(BookSnapshot::new(vec![lvl("100.0", "1.5")], vec![lvl("100.5", "-2.0")]))
            .unwrap();
        let diff = DepthDiff { checksum: Some(12345), ..DepthDiff::new(0, 0, 0, vec![lvl("100.0", "3.0")], vec![]) };
        assert!(matches!(engine.feed(diff).unwrap(), SyncAction::Gap(GapReason::ChecksumMismatch { .. })));
    }

    #[test]
    fn zero_qty_deletes_the_level() {
        let mut engine = BitfinexSyncEngine::new(1000);
        engine.adopt_snapshot(BookSnapshot::new(vec![lvl("100.0", "1.5")], vec![])).unwrap();
        engine.feed(DepthDiff::new(0, 0, 0, vec![lvl("100.0", "0")], vec![])).unwrap();
        assert!(engine.lob().best_bid().is_none());
    }

    #[test]
    fn ask_amounts_project_as_positive_display_quantity() {
        let mut engine = BitfinexSyncEngine::new(1000);
        engine.adopt_snapshot(BookSnapshot::new(vec![], vec![lvl("100.5", "-2.0")])).unwrap();
        assert_eq!(engine.lob().best_ask(), Some(100.5));
        assert_eq!(engine.lob().top_n(1).1, vec![(100.5, 2.0)]);
    }
}
