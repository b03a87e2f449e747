//! Depth-capped dual-sided book shared by the checksum engines (Kraken,
//! Bitfinex). Grounded on `mm_core/checksum_engine.py::KrakenBook` and
//! `mm_core/checksum/bitfinex.py::BitfinexBook`, which key by `Decimal` so the
//! original price string round-trips exactly through `str()`. We key by `f64`
//! for ordering but keep the literal wire strings in `Level`, so checksum
//! canonicalization stays byte-exact without pulling in a decimal crate.

use crate::error::CoreError;
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Level {
    pub price_str: String,
    /// Kept verbatim, sign included — Bitfinex's checksum needs ask amounts
    /// to stay negative even though `LocalOrderBook` projection wants `abs`.
    pub qty_str: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceKey(pub f64);

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Depth-capped order book, best-first on both sides: bids keyed by
/// `Reverse<PriceKey>` so high prices sort first, asks by `PriceKey` so low
/// prices sort first.
#[derive(Debug, Clone)]
pub struct CappedBook {
    pub bids: BTreeMap<Reverse<PriceKey>, Level>,
    pub asks: BTreeMap<PriceKey, Level>,
    pub depth: usize,
}

impl CappedBook {
    pub fn new(depth: usize) -> Self {
        Self { bids: BTreeMap::new(), asks: BTreeMap::new(), depth }
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    fn trim<K: Ord + Copy, V>(map: &mut BTreeMap<K, V>, depth: usize) {
        while map.len() > depth {
            let Some(worst) = map.keys().next_back().copied() else { break };
            map.remove(&worst);
        }
    }

    /// Upsert, or (on zero quantity) delete, one level.
    pub fn upsert(&mut self, price_str: &str, qty_str: &str, is_bid: bool) -> Result<(), CoreError> {
        let price: f64 = price_str
            .parse()
            .map_err(|_| CoreError::ParseError(format!("bad price {price_str:?}")))?;
        let qty: f64 = qty_str
            .parse()
            .map_err(|_| CoreError::ParseError(format!("bad qty {qty_str:?}")))?;

        if is_bid {
            let key = Reverse(PriceKey(price));
            if qty == 0.0 {
                self.bids.remove(&key);
            } else {
                self.bids.insert(key, Level { price_str: price_str.to_string(), qty_str: qty_str.to_string() });
                Self::trim(&mut self.bids, self.depth);
            }
        } else {
            let key = PriceKey(price);
            if qty == 0.0 {
                self.asks.remove(&key);
            } else {
                self.asks.insert(key, Level { price_str: price_str.to_string(), qty_str: qty_str.to_string() });
                Self::trim(&mut self.asks, self.depth);
            }
        }
        Ok(())
    }

    /// Projected `(price, |qty|)` pairs, for `LocalOrderBook::replace_levels`.
    pub fn top_n(&self, n: usize) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        let bids = self
            .bids
            .iter()
            .take(n)
            .filter_map(|(k, lvl)| lvl.qty_str.parse::<f64>().ok().map(|q| (k.0 .0, q.abs())))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(n)
            .filter_map(|(k, lvl)| lvl.qty_str.parse::<f64>().ok().map(|q| (k.0, q.abs())))
            .collect();
        (bids, asks)
    }
}

/// Kraken checksum canonicalization: strip `.` then leading zeros from the
/// original decimal string (empty result normalizes to `"0"`).
pub fn norm_crc_str(val: &str) -> String {
    let stripped: String = val.chars().filter(|&c| c != '.').collect();
    let trimmed = stripped.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_crc_str_strips_dot_and_leading_zeros() {
        assert_eq!(norm_crc_str("007.0100"), "70100");
        assert_eq!(norm_crc_str("0.00000100"), "100");
        assert_eq!(norm_crc_str("0"), "0");
        assert_eq!(norm_crc_str("0.0"), "0");
    }

    #[test]
    fn upsert_and_trim_keeps_best_n_per_side() {
        let mut book = CappedBook::new(2);
        book.upsert("100", "1", true).unwrap();
        book.upsert("99", "1", true).unwrap();
        book.upsert("101", "1", true).unwrap();
        assert_eq!(book.bids.len(), 2);
        let (bids, _) = book.top_n(2);
        assert_eq!(bids, vec![(101.0, 1.0), (100.0, 1.0)]);
    }

    #[test]
    fn upsert_zero_qty_deletes() {
        let mut book = CappedBook::new(10);
        book.upsert("100", "1", false).unwrap();
        book.upsert("100", "0", false).unwrap();
        assert!(book.asks.is_empty());
    }
}
