//! `Trade`: one executed trade print, normalized across exchanges.
//! Grounded on `mm_recorder/exchanges/types.py::Trade`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub event_time_ms: i64,
    pub trade_id: i64,
    pub trade_time_ms: i64,
    pub price: f64,
    pub qty: f64,
    /// Binance-style flag: 1 if the buyer was the maker.
    pub is_buyer_maker: bool,
    /// Taker side, when the exchange reports it directly (Kraken/Bitfinex) rather
    /// than only `is_buyer_maker` (Binance).
    pub side: Option<String>,
    pub ord_type: Option<String>,
    pub raw: Option<serde_json::Value>,
}

impl Trade {
    /// Resolve a display side even for adapters that only supply `is_buyer_maker`.
    pub fn resolved_side(&self) -> &str {
        match &self.side {
            Some(s) => s.as_str(),
            None => {
                if self.is_buyer_maker {
                    "sell"
                } else {
                    "buy"
                }
            }
        }
    }
}
