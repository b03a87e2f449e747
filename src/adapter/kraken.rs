//! Kraken adapter, grounded on `mm_recorder/exchanges/kraken.py` and
//! `mm_core/checksum/kraken.py`. Kraken v2 multiplexes snapshot/update/trade
//! frames on a single WS connection rather than numbering updates, so
//! `sync_mode` is `Checksum` and `u_start`/`u_end` stay zero.

use super::{value_to_string, ExchangeAdapter, ParsedBatch};
use crate::error::CoreError;
use crate::model::{BookSnapshot, DepthDiff, Trade};
use crate::sync::kraken::KrakenSyncEngine;
use crate::sync::{SyncEngine, SyncMode};
use serde_json::Value;

const ALLOWED_DEPTHS: [usize; 5] = [10, 25, 100, 500, 1000];

pub struct KrakenAdapter;

impl KrakenAdapter {
    fn select_depth(&self, depth: usize) -> usize {
        if ALLOWED_DEPTHS.contains(&depth) {
            return depth;
        }
        ALLOWED_DEPTHS.iter().copied().find(|&c| depth <= c).unwrap_or(*ALLOWED_DEPTHS.last().unwrap())
    }
}

impl ExchangeAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Checksum
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        let s = symbol.trim().to_uppercase();
        if s.contains('/') {
            return s;
        }
        if let Some((base, quote)) = s.split_once('-') {
            return format!("{base}/{quote}");
        }
        if s.len() >= 6 {
            let (base, quote) = s.split_at(s.len() - 3);
            return format!("{base}/{quote}");
        }
        s
    }

    fn ws_url(&self, _symbol: &str) -> String {
        "wss://ws.kraken.com/v2".to_string()
    }

    fn normalize_depth(&self, depth: usize) -> usize {
        self.select_depth(depth)
    }

    fn subscribe_messages(&self, symbol: &str, depth: usize) -> Vec<Value> {
        let depth = self.normalize_depth(depth);
        let sym = self.normalize_symbol(symbol);
        vec![
            serde_json::json!({
                "method": "subscribe",
                "params": {"channel": "book", "symbol": [sym], "depth": depth, "snapshot": true},
            }),
            serde_json::json!({
                "method": "subscribe",
                "params": {"channel": "trade", "symbol": [sym], "snapshot": true},
            }),
        ]
    }

    fn create_sync_engine(&self, depth: usize, max_buffer_size: usize) -> Box<dyn SyncEngine + Send> {
        Box::new(KrakenSyncEngine::new(self.normalize_depth(depth), max_buffer_size))
    }

    fn parse_message(&mut self, data: &Value) -> Result<ParsedBatch, CoreError> {
        let mut batch = ParsedBatch::default();
        let channel = data.get("channel").and_then(|v| v.as_str());
        let msg_type = data.get("type").and_then(|v| v.as_str());
        let entries = data.get("data").and_then(|v| v.as_array());

        match channel {
            Some("book") => {
                for entry in entries.into_iter().flatten() {
                    let bids = level_entries(entry.get("bids"));
                    let asks = level_entries(entry.get("asks"));
                    let checksum = entry.get("checksum").and_then(|v| v.as_i64()).map(|v| v as u32);
                    let event_time_ms = parse_event_ms(entry.get("timestamp"));
                    match msg_type {
                        Some("snapshot") => batch.snapshots.push(BookSnapshot {
                            event_time_ms,
                            bids,
                            asks,
                            last_update_id: None,
                            checksum,
                            raw: Some(entry.clone()),
                        }),
                        Some("update") => batch.diffs.push(DepthDiff {
                            event_time_ms,
                            u_start: 0,
                            u_end: 0,
                            bids,
                            asks,
                            checksum,
                            raw: Some(entry.clone()),
                        }),
                        _ => {}
                    }
                }
            }
            Some("trade") => {
                for (idx, entry) in entries.into_iter().flatten().enumerate() {
                    let event_time_ms = parse_event_ms(entry.get("timestamp"));
                    let side = entry.get("side").and_then(|v| v.as_str()).unwrap_or("").to_lowercase();
                    let is_buyer_maker = side != "buy";
                    let trade_id = entry
                        .get("trade_id")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(event_time_ms * 1000 + idx as i64);
                    let price = entry.get("price").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    let qty = entry.get("qty").and_then(|v| v.as_f64()).unwrap_or(0.0);
                    batch.trades.push(Trade {
                        event_time_ms,
                        trade_id,
                        trade_time_ms: event_time_ms,
                        price,
                        qty,
                        is_buyer_maker,
                        side: Some(side),
                        ord_type: None,
                        raw: Some(entry.clone()),
                    });
                }
            }
            _ => {}
        }
        Ok(batch)
    }
}

fn level_entries(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(arr) = value.and_then(|v| v.as_array()) else { return Vec::new() };
    arr.iter()
        .filter_map(|lv| {
            if let Some(obj) = lv.as_object() {
                Some((value_to_string(obj.get("price")?), value_to_string(obj.get("qty")?)))
            } else {
                let pair = lv.as_array()?;
                Some((value_to_string(pair.first()?), value_to_string(pair.get(1)?)))
            }
        })
        .collect()
}

fn parse_event_ms(value: Option<&Value>) -> i64 {
    let Some(v) = value else { return 0 };
    if let Some(f) = v.as_f64() {
        return (f * 1000.0) as i64;
    }
    if let Some(s) = v.as_str() {
        if let Ok(f) = s.parse::<f64>() {
            return (f * 1000.0) as i64;
        }
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
            return dt.timestamp_millis();
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_dashed_and_bare_symbols() {
        let adapter = KrakenAdapter;
        assert_eq!(adapter.normalize_symbol("btc-usd"), "BTC/USD");
        assert_eq!(adapter.normalize_symbol("BTCUSD"), "BTC/USD");
        assert_eq!(adapter.normalize_symbol("xbt/usd"), "XBT/USD");
    }

    #[test]
    fn normalize_depth_rounds_up_to_allowed_tier() {
        let adapter = KrakenAdapter;
        assert_eq!(adapter.normalize_depth(10), 10);
        assert_eq!(adapter.normalize_depth(20), 25);
        assert_eq!(adapter.normalize_depth(2000), 1000);
    }

    #[test]
    fn parses_book_snapshot_and_update() {
        let mut adapter = KrakenAdapter;
        let snapshot = json!({
            "channel": "book", "type": "snapshot",
            "data": [{"symbol":"BTC/USD","bids":[{"price":100.0,"qty":1.0}],"asks":[{"price":101.0,"qty":2.0}],"checksum":123}]
        });
        let batch = adapter.parse_message(&snapshot).unwrap();
        assert_eq!(batch.snapshots.len(), 1);
        assert_eq!(batch.snapshots[0].checksum, Some(123));

        let update = json!({
            "channel": "book", "type": "update",
            "data": [{"symbol":"BTC/USD","bids":[{"price":100.0,"qty":0.0}],"asks":[],"checksum":456}]
        });
        let batch = adapter.parse_message(&update).unwrap();
        assert_eq!(batch.diffs.len(), 1);
        assert_eq!(batch.diffs[0].checksum, Some(456));
    }

    #[test]
    fn parses_trade_channel() {
        let mut adapter = KrakenAdapter;
        let frame = json!({
            "channel": "trade", "type": "update",
            "data": [{"symbol":"BTC/USD","side":"sell","price":100.0,"qty":0.5,"trade_id":42,"timestamp":1.0}]
        });
        let batch = adapter.parse_message(&frame).unwrap();
        assert_eq!(batch.trades.len(), 1);
        assert!(batch.trades[0].is_buyer_maker);
    }
}
