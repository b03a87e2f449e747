//! Checksum-verifying sync engine for Kraken, grounded on
//! `mm_core/checksum_engine.py::KrakenSyncEngine`.
//!
//! Unlike the sequence engine there is no horizon to bridge: the book is
//! `depth_synced` the instant a snapshot is adopted, and a fresh CRC-32
//! mismatch on any subsequent update is the only gap signal.

use super::capped_book::{norm_crc_str, CappedBook};
use super::SyncEngine;
use crate::error::{CoreError, GapReason, SyncAction};
use crate::model::{BookSnapshot, DepthDiff, LocalOrderBook};

/// Checksum always covers the top 10 levels regardless of subscribed depth
/// (Kraken v2 `book` channel docs), while the book itself is capped at the
/// subscribed depth (10/25/100/500/1000).
const CHECKSUM_DEPTH: usize = 10;

pub struct KrakenSyncEngine {
    book: CappedBook,
    lob: LocalOrderBook,
    buffer: Vec<DepthDiff>,
    max_buffer_size: usize,
    snapshot_loaded: bool,
    depth_synced: bool,
    last_recv_seq: Option<u64>,
}

impl KrakenSyncEngine {
    pub fn new(subscribed_depth: usize, max_buffer_size: usize) -> Self {
        Self {
            book: CappedBook::new(subscribed_depth),
            lob: LocalOrderBook::default(),
            buffer: Vec::new(),
            max_buffer_size,
            snapshot_loaded: false,
            depth_synced: false,
            last_recv_seq: None,
        }
    }

    fn project(&mut self) {
        let (bids, asks) = self.book.top_n(self.book.depth);
        self.lob.replace_levels(bids, asks);
    }

    /// Asks-then-bids, normalized price+qty strings concatenated (spec §4.3).
    fn checksum(&self) -> u32 {
        let mut buf = String::new();
        for (_, lvl) in self.book.asks.iter().take(CHECKSUM_DEPTH) {
            buf.push_str(&norm_crc_str(&lvl.price_str));
            buf.push_str(&norm_crc_str(&lvl.qty_str));
        }
        for (_, lvl) in self.book.bids.iter().take(CHECKSUM_DEPTH) {
            buf.push_str(&norm_crc_str(&lvl.price_str));
            buf.push_str(&norm_crc_str(&lvl.qty_str));
        }
        crc32fast::hash(buf.as_bytes())
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

impl SyncEngine for KrakenSyncEngine {
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

        // Re-apply anything that arrived over the wire while we waited on the
        // snapshot frame (mirrors `adopt_snapshot` replaying the pre-sync buffer).
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
    fn buffers_before_snapshot() {
        let mut engine = KrakenSyncEngine::new(10, 1000);
        let action = engine.feed(DepthDiff::new(0, 0, 0, vec![lvl("1", "1")], vec![])).unwrap();
        assert_eq!(action, SyncAction::Buffered);
        assert_eq!(engine.buffer_len(), 1);
    }

    #[test]
    fn adopts_snapshot_and_is_synced_immediately() {
        let mut engine = KrakenSyncEngine::new(10, 1000);
        let snapshot = BookSnapshot::new(vec![lvl("100.00", "1.0")], vec![lvl("100.50", "1.5")]);
        engine.adopt_snapshot(snapshot).unwrap();
        assert!(engine.snapshot_loaded());
        assert!(engine.depth_synced());
        assert_eq!(engine.lob().best_bid(), Some(100.00));
    }

    /// S4: a matching checksum applies cleanly; a wrong one is a gap.
    #[test]
    fn s4_matching_checksum_applies_mismatch_is_gap() {
        let mut engine = KrakenSyncEngine::new(10, 1000);
        engine
            .adopt_snapshot(BookSnapshot::new(vec![lvl("100.00", "1.0")], vec![lvl("100.50", "1.5")]))
            .unwrap();

        let expected = engine.checksum();
        let good = DepthDiff { checksum: Some(expected), ..DepthDiff::new(0, 0, 0, vec![], vec![]) };
        assert_eq!(engine.feed(good).unwrap(), SyncAction::Applied);

        let bad = DepthDiff {
            checksum: Some(expected.wrapping_add(1)),
            ..DepthDiff::new(0, 0, 0, vec![lvl("100.00", "2.0")], vec![])
        };
        assert!(matches!(engine.feed(bad).unwrap(), SyncAction::Gap(GapReason::ChecksumMismatch { .. })));
    }

    #[test]
    fn depth_cap_keeps_only_subscribed_depth() {
        let mut engine = KrakenSyncEngine::new(1, 1000);
        engine.adopt_snapshot(BookSnapshot::new(vec![lvl("100", "1"), lvl("99", "1")], vec![])).unwrap();
        assert_eq!(engine.lob().bid_count(), 1);
        assert_eq!(engine.lob().best_bid(), Some(100.0));
    }

    #[test]
    fn reset_for_resync_clears_book_and_buffer() {
        let mut engine = KrakenSyncEngine::new(10, 1000);
        engine.adopt_snapshot(BookSnapshot::new(vec![lvl("100", "1")], vec![])).unwrap();
        engine.reset_for_resync();
        assert!(!engine.snapshot_loaded());
        assert!(!engine.depth_synced());
        assert!(engine.lob().is_empty());
    }
}
