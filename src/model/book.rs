//! The price-keyed L2 order book (spec §4.1), grounded on
//! `mm_core/local_orderbook.py`'s `apply_diff`/`top_n` semantics, using a
//! side-aware `BTreeMap` ordering in place of the original's repeated sort.

use crate::error::{CoreError, GapReason, SyncAction};
use std::collections::BTreeMap;

/// A price key ordered so that a `BTreeMap` iterates bids best-first
/// (descending) and asks best-first (ascending).
#[derive(Debug, Clone, Copy)]
struct OrderedPrice {
    price: f64,
    is_bid: bool,
}

impl PartialEq for OrderedPrice {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price
    }
}
impl Eq for OrderedPrice {}

impl PartialOrd for OrderedPrice {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedPrice {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.is_bid {
            other.price.total_cmp(&self.price)
        } else {
            self.price.total_cmp(&other.price)
        }
    }
}

/// One side's worth of price levels: price -> quantity.
type Side = BTreeMap<OrderedPrice, f64>;

/// In-memory L2 book keyed by exact price. Mirrors `mm_core.local_orderbook.LocalOrderBook`.
#[derive(Debug, Clone)]
pub struct LocalOrderBook {
    bids: Side,
    asks: Side,
    /// Binance-style sequence horizon. `None` before any snapshot is loaded.
    pub last_update_id: Option<u64>,
    /// Configured tick size, or `None` for exchanges without a fixed tick
    /// (spec §9 open question — Bitfinex).
    pub tick_size: Option<f64>,
}

fn parse_level(price: &str, qty: &str) -> Result<(f64, f64), CoreError> {
    let p: f64 = price
        .parse()
        .map_err(|_| CoreError::ParseError(format!("bad price {price:?}")))?;
    let q: f64 = qty
        .parse()
        .map_err(|_| CoreError::ParseError(format!("bad qty {qty:?}")))?;
    Ok((p, q))
}

impl Default for LocalOrderBook {
    fn default() -> Self {
        Self::new(None)
    }
}

impl LocalOrderBook {
    pub fn new(tick_size: Option<f64>) -> Self {
        Self { bids: BTreeMap::new(), asks: BTreeMap::new(), last_update_id: None, tick_size }
    }

    /// Tick-alignment tolerance per spec §4.1: `0.5 * tick_size * 1e-6`, or tighter.
    fn tick_tolerance(tick_size: f64) -> f64 {
        0.5 * tick_size * 1e-6
    }

    fn check_tick_alignment(&self, price: f64) -> Result<(), CoreError> {
        let Some(tick) = self.tick_size else { return Ok(()) };
        if tick <= 0.0 {
            return Ok(());
        }
        let ratio = price / tick;
        let nearest = ratio.round();
        let residual = (ratio - nearest).abs() * tick;
        let tolerance = Self::tick_tolerance(tick);
        if residual > tolerance {
            return Err(CoreError::TickAlignment { price, tick_size: tick, tolerance });
        }
        Ok(())
    }

    /// Clears state, ingests levels (dropping `qty==0`), and sets `last_update_id`.
    pub fn load_snapshot(
        &mut self,
        bids: &[(String, String)],
        asks: &[(String, String)],
        last_update_id: u64,
    ) -> Result<(), CoreError> {
        self.bids.clear();
        self.asks.clear();

        for (p, q) in bids {
            let (price, qty) = parse_level(p, q)?;
            if qty != 0.0 {
                self.check_tick_alignment(price)?;
                self.bids.insert(OrderedPrice { price, is_bid: true }, qty);
            }
        }
        for (p, q) in asks {
            let (price, qty) = parse_level(p, q)?;
            if qty != 0.0 {
                self.check_tick_alignment(price)?;
                self.asks.insert(OrderedPrice { price, is_bid: false }, qty);
            }
        }
        self.last_update_id = Some(last_update_id);
        Ok(())
    }

    /// Apply a sequence-numbered diff. See spec §4.1.
    pub fn apply_diff(
        &mut self,
        u_start: u64,
        u_end: u64,
        bid_updates: &[(String, String)],
        ask_updates: &[(String, String)],
    ) -> Result<SyncAction, CoreError> {
        let Some(last) = self.last_update_id else {
            return Ok(SyncAction::Gap(GapReason::Invalid("no last_update_id".into())));
        };

        if u_end <= last {
            return Ok(SyncAction::Stale);
        }
        if u_start > last + 1 {
            return Ok(SyncAction::Gap(GapReason::SequenceGap { expected_after: last, got_u: u_end }));
        }

        for (p, q) in bid_updates {
            let (price, qty) = parse_level(p, q)?;
            if qty == 0.0 {
                self.bids.remove(&OrderedPrice { price, is_bid: true });
            } else {
                self.check_tick_alignment(price)?;
                self.bids.insert(OrderedPrice { price, is_bid: true }, qty);
            }
        }
        for (p, q) in ask_updates {
            let (price, qty) = parse_level(p, q)?;
            if qty == 0.0 {
                self.asks.remove(&OrderedPrice { price, is_bid: false });
            } else {
                self.check_tick_alignment(price)?;
                self.asks.insert(OrderedPrice { price, is_bid: false }, qty);
            }
        }

        self.last_update_id = Some(u_end);
        Ok(SyncAction::Applied)
    }

    /// Top-N levels of each side, in canonical order (bids desc, asks asc).
    pub fn top_n(&self, n: usize) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        if n == 0 {
            return (Vec::new(), Vec::new());
        }
        let bids = self.bids.iter().take(n).map(|(k, v)| (k.price, *v)).collect();
        let asks = self.asks.iter().take(n).map(|(k, v)| (k.price, *v)).collect();
        (bids, asks)
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next().map(|k| k.price)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|k| k.price)
    }

    /// Invariant 3/§8: best_bid < best_ask whenever both sides are populated.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => b >= a,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Replace both sides directly, e.g. from a checksum engine's trimmed book.
    /// Used when a `LocalOrderBook` is the top-N projection of a depth-capped book.
    pub fn replace_levels(&mut self, bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) {
        self.bids = bids.into_iter().map(|(p, q)| (OrderedPrice { price: p, is_bid: true }, q)).collect();
        self.asks = asks.into_iter().map(|(p, q)| (OrderedPrice { price: p, is_bid: false }, q)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lvl(p: &str, q: &str) -> (String, String) {
        (p.to_string(), q.to_string())
    }

    #[test]
    fn load_snapshot_drops_zero_qty_and_sets_last_update_id() {
        let mut lob = LocalOrderBook::default();
        lob.load_snapshot(&[lvl("100", "1"), lvl("99", "0")], &[lvl("101", "1")], 10).unwrap();
        assert_eq!(lob.last_update_id, Some(10));
        assert_eq!(lob.bid_count(), 1);
        let (bids, asks) = lob.top_n(5);
        assert_eq!(bids, vec![(100.0, 1.0)]);
        assert_eq!(asks, vec![(101.0, 1.0)]);
    }

    #[test]
    fn apply_diff_s1_binance_bridge_sequence() {
        let mut lob = LocalOrderBook::default();
        lob.load_snapshot(&[lvl("100", "1")], &[lvl("101", "1")], 10).unwrap();
        let action = lob.apply_diff(10, 11, &[], &[]).unwrap();
        assert_eq!(action, SyncAction::Applied);
        assert_eq!(lob.last_update_id, Some(11));
        let action2 = lob.apply_diff(12, 12, &[], &[]).unwrap();
        assert_eq!(action2, SyncAction::Applied);
        assert_eq!(lob.last_update_id, Some(12));
    }

    #[test]
    fn apply_diff_stale_is_idempotent() {
        let mut lob = LocalOrderBook::default();
        lob.load_snapshot(&[lvl("100", "1")], &[lvl("101", "1")], 10).unwrap();
        let before = lob.top_n(5);
        let action = lob.apply_diff(1, 5, &[lvl("100", "99")], &[]).unwrap();
        assert_eq!(action, SyncAction::Stale);
        assert_eq!(lob.top_n(5), before);
        assert_eq!(lob.last_update_id, Some(10));
    }

    #[test]
    fn apply_diff_gap_does_not_mutate_book() {
        let mut lob = LocalOrderBook::default();
        lob.load_snapshot(&[lvl("100", "1")], &[lvl("101", "1")], 10).unwrap();
        let before = lob.top_n(5);
        let action = lob.apply_diff(50, 51, &[lvl("200", "5")], &[]).unwrap();
        assert!(matches!(action, SyncAction::Gap(GapReason::SequenceGap { .. })));
        assert_eq!(lob.top_n(5), before);
        assert_eq!(lob.last_update_id, Some(10));
    }

    #[test]
    fn apply_diff_without_snapshot_is_gap() {
        let mut lob = LocalOrderBook::default();
        let action = lob.apply_diff(1, 2, &[], &[]).unwrap();
        assert!(action.is_gap());
    }

    #[test]
    fn tick_alignment_rejects_misaligned_price() {
        let mut lob = LocalOrderBook::new(Some(0.01));
        let err = lob.load_snapshot(&[lvl("100.005", "1")], &[], 1).unwrap_err();
        assert!(matches!(err, CoreError::TickAlignment { .. }));
    }

    #[test]
    fn tick_rollover_reveals_deeper_levels() {
        let mut lob = LocalOrderBook::default();
        lob.load_snapshot(
            &[lvl("100", "1"), lvl("99", "1"), lvl("98", "1")],
            &[lvl("101", "1")],
            1,
        )
        .unwrap();
        let (bids, _) = lob.top_n(1);
        assert_eq!(bids, vec![(100.0, 1.0)]);
        lob.apply_diff(1, 2, &[lvl("100", "0")], &[]).unwrap();
        let (bids, _) = lob.top_n(1);
        assert_eq!(bids, vec![(99.0, 1.0)]);
        assert!(!lob.is_empty());
    }

    #[test]
    fn best_bid_below_best_ask_when_populated() {
        let mut lob = LocalOrderBook::default();
        lob.load_snapshot(&[lvl("100", "1")], &[lvl("101", "1")], 1).unwrap();
        assert!(!lob.is_crossed());
        assert!(lob.best_bid().unwrap() < lob.best_ask().unwrap());
    }
}
