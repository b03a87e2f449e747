//! Heap-merge of the events/depth/trades streams by `(recv_ms, recv_seq)`
//! (spec §4.6), grounded on `mm/backtest/replay.py`'s `heapq`-based
//! `push_next`/merge loop, expressed here with a `BinaryHeap` over a
//! `Reverse`-ordered entry so the heap pops in ascending order.
//!
//! Legacy rows without a `recv_seq` (spec §9 open question) fall back to a
//! locally assigned tie-break counter so ordering stays deterministic even
//! though it isn't guaranteed byte-identical to the original live order.

use super::reader::{DepthRecord, EventRecord, TradeRecord};
use crate::error::CoreError;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamTag {
    Event,
    Depth,
    Trade,
}

/// One record pulled off the merge, tagged by which stream it came from.
#[derive(Debug)]
pub enum ReplayRecord {
    Event(EventRecord),
    Depth(DepthRecord),
    Trade(TradeRecord),
}

impl ReplayRecord {
    fn recv_key(&self) -> (i64, Option<u64>) {
        match self {
            ReplayRecord::Event(e) => (e.recv_time_ms, Some(e.recv_seq)),
            ReplayRecord::Depth(d) => (d.recv_ms, d.recv_seq),
            ReplayRecord::Trade(t) => (t.recv_time_ms, t.recv_seq),
        }
    }

    fn tag(&self) -> StreamTag {
        match self {
            ReplayRecord::Event(_) => StreamTag::Event,
            ReplayRecord::Depth(_) => StreamTag::Depth,
            ReplayRecord::Trade(_) => StreamTag::Trade,
        }
    }
}

struct HeapEntry {
    recv_ms: i64,
    seq_key: i64,
    tie_seq: u64,
    record: ReplayRecord,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.recv_ms, self.seq_key, self.tie_seq) == (other.recv_ms, other.seq_key, other.tie_seq)
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the tuple compare for min-heap behavior.
        (other.recv_ms, other.seq_key, other.tie_seq).cmp(&(self.recv_ms, self.seq_key, self.tie_seq))
    }
}

type EventIter = Box<dyn Iterator<Item = Result<EventRecord, CoreError>>>;
type DepthIter = Box<dyn Iterator<Item = Result<DepthRecord, CoreError>>>;
type TradeIter = Box<dyn Iterator<Item = Result<TradeRecord, CoreError>>>;

/// k-way merge over the three per-day streams (spec §4.6 "merge discipline").
pub struct StreamMerge {
    heap: BinaryHeap<HeapEntry>,
    events: EventIter,
    depths: DepthIter,
    trades: TradeIter,
    tie_seq: u64,
}

impl StreamMerge {
    pub fn new(events: EventIter, depths: DepthIter, trades: TradeIter) -> Self {
        let mut merge = Self { heap: BinaryHeap::new(), events, depths, trades, tie_seq: 0 };
        merge.pull(StreamTag::Event);
        merge.pull(StreamTag::Depth);
        merge.pull(StreamTag::Trade);
        merge
    }

    /// Pull the next record off one named stream, logging and skipping any
    /// corrupt row rather than stalling the merge (spec §4.6 "failure semantics").
    fn pull(&mut self, tag: StreamTag) {
        loop {
            let next = match tag {
                StreamTag::Event => self.events.next().map(|r| r.map(ReplayRecord::Event)),
                StreamTag::Depth => self.depths.next().map(|r| r.map(ReplayRecord::Depth)),
                StreamTag::Trade => self.trades.next().map(|r| r.map(ReplayRecord::Trade)),
            };
            match next {
                None => return,
                Some(Ok(record)) => {
                    let (recv_ms, recv_seq) = record.recv_key();
                    let seq_key = recv_seq.map(|s| s as i64).unwrap_or(self.tie_seq as i64);
                    let tie_seq = self.tie_seq;
                    self.tie_seq += 1;
                    self.heap.push(HeapEntry { recv_ms, seq_key, tie_seq, record });
                    return;
                }
                Some(Err(e)) => {
                    tracing::warn!(stream = ?tag, "skipping corrupt replay record: {e}");
                    continue;
                }
            }
        }
    }
}

impl Iterator for StreamMerge {
    type Item = ReplayRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.heap.pop()?;
        let tag = entry.record.tag();
        self.pull(tag);
        Some(entry.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(recv_ms: i64, recv_seq: u64) -> EventRecord {
        EventRecord { event_id: 0, recv_time_ms: recv_ms, recv_seq, run_id: 1, event_type: "x".into(), epoch_id: 0, details: serde_json::Value::Null }
    }

    fn depth(recv_ms: i64, recv_seq: Option<u64>) -> DepthRecord {
        DepthRecord { recv_ms, recv_seq, event_time_ms: recv_ms, u_start: 0, u_end: 0, bids: vec![], asks: vec![], checksum: None, raw: None }
    }

    #[test]
    fn merges_three_streams_by_recv_ms_then_recv_seq() {
        let events: EventIter = Box::new(vec![Ok(ev(100, 5))].into_iter());
        let depths: DepthIter = Box::new(vec![Ok(depth(100, Some(1))), Ok(depth(200, Some(9)))].into_iter());
        let trades: TradeIter = Box::new(std::iter::empty());

        let merged: Vec<ReplayRecord> = StreamMerge::new(events, depths, trades).collect();
        assert_eq!(merged.len(), 3);
        assert!(matches!(merged[0], ReplayRecord::Depth(ref d) if d.recv_ms == 100));
        assert!(matches!(merged[1], ReplayRecord::Event(ref e) if e.recv_time_ms == 100));
        assert!(matches!(merged[2], ReplayRecord::Depth(ref d) if d.recv_ms == 200));
    }

    #[test]
    fn legacy_rows_without_recv_seq_fall_back_to_tie_break_but_stay_deterministic() {
        let events: EventIter = Box::new(std::iter::empty());
        let depths: DepthIter = Box::new(vec![Ok(depth(100, None)), Ok(depth(100, None))].into_iter());
        let trades: TradeIter = Box::new(std::iter::empty());

        let merged: Vec<ReplayRecord> = StreamMerge::new(events, depths, trades).collect();
        assert_eq!(merged.len(), 2);
    }
}
