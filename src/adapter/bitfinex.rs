//! Bitfinex adapter, grounded on `mm_recorder/exchanges/bitfinex.py`.
//! Bitfinex v2 frames everything as bare JSON arrays keyed by a per-channel
//! `chanId` learned from the `"subscribed"` event, so this adapter is the one
//! with real per-connection state.

use super::{value_to_string, ExchangeAdapter, ParsedBatch};
use crate::error::CoreError;
use crate::model::{BookSnapshot, DepthDiff, Trade};
use crate::sync::bitfinex::BitfinexSyncEngine;
use crate::sync::{SyncEngine, SyncMode};
use serde_json::Value;

pub struct BitfinexAdapter {
    book_chan_id: Option<i64>,
    trades_chan_id: Option<i64>,
}

impl BitfinexAdapter {
    pub fn new() -> Self {
        Self { book_chan_id: None, trades_chan_id: None }
    }
}

impl Default for BitfinexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_ms(ts: f64) -> i64 {
    if ts > 1e12 {
        ts as i64
    } else {
        (ts * 1000.0) as i64
    }
}

impl ExchangeAdapter for BitfinexAdapter {
    fn name(&self) -> &'static str {
        "bitfinex"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Checksum
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        let mut s: String = symbol.chars().filter(|c| !matches!(c, '/' | '-' | ':')).collect();
        s = s.trim().to_uppercase();
        if s.is_empty() {
            return s;
        }
        if let Some(rest) = s.strip_prefix('T') {
            s = rest.to_string();
        }
        format!("t{s}")
    }

    fn normalize_depth(&self, _depth: usize) -> usize {
        25
    }

    fn ws_url(&self, _symbol: &str) -> String {
        "wss://api.bitfinex.com/ws/2".to_string()
    }

    fn subscribe_messages(&self, symbol: &str, _depth: usize) -> Vec<Value> {
        let pair = self.normalize_symbol(symbol);
        vec![
            serde_json::json!({"event": "conf", "flags": 131072}),
            serde_json::json!({"event": "subscribe", "channel": "book", "pair": pair, "prec": "P0", "freq": "F0", "len": 25}),
            serde_json::json!({"event": "subscribe", "channel": "trades", "pair": pair}),
        ]
    }

    fn create_sync_engine(&self, _depth: usize, max_buffer_size: usize) -> Box<dyn SyncEngine + Send> {
        Box::new(BitfinexSyncEngine::new(max_buffer_size))
    }

    fn parse_message(&mut self, data: &Value) -> Result<ParsedBatch, CoreError> {
        let mut batch = ParsedBatch::default();

        if let Some(obj) = data.as_object() {
            if obj.get("event").and_then(|v| v.as_str()) == Some("subscribed") {
                let chan_id = obj.get("chanId").and_then(|v| v.as_i64());
                match obj.get("channel").and_then(|v| v.as_str()) {
                    Some("book") => self.book_chan_id = chan_id,
                    Some("trades") => self.trades_chan_id = chan_id,
                    _ => {}
                }
            }
            return Ok(batch);
        }

        let Some(arr) = data.as_array() else { return Ok(batch) };
        if arr.is_empty() {
            return Ok(batch);
        }
        let chan_id = arr[0].as_i64();

        if chan_id.is_some() && chan_id == self.book_chan_id {
            self.parse_book_frame(arr, &mut batch);
            return Ok(batch);
        }
        if chan_id.is_some() && chan_id == self.trades_chan_id {
            self.parse_trades_frame(arr, &mut batch);
        }
        Ok(batch)
    }
}

impl BitfinexAdapter {
    fn parse_book_frame(&self, arr: &[Value], batch: &mut ParsedBatch) {
        if arr.len() >= 2 && arr[1].as_str() == Some("hb") {
            return;
        }
        if arr.len() >= 2 && arr[1].as_str() == Some("cs") {
            // Exchange checksum is a signed int32; reinterpret to the same
            // unsigned bit pattern `BitfinexSyncEngine::checksum` produces.
            let signed = arr.get(2).and_then(|v| v.as_i64()).unwrap_or(0);
            let computed_u32 = signed as i32 as u32;
            batch.diffs.push(DepthDiff {
                event_time_ms: 0,
                u_start: 0,
                u_end: 0,
                bids: vec![],
                asks: vec![],
                checksum: Some(computed_u32),
                raw: Some(serde_json::json!({"type": "checksum"})),
            });
            return;
        }

        // Snapshot: [chanId, [[price, count, amount], ...]]
        if arr.len() == 2 {
            if let Some(rows) = arr[1].as_array() {
                if rows.first().map(|r| r.is_array()).unwrap_or(false) {
                    let mut bids = Vec::new();
                    let mut asks = Vec::new();
                    for row in rows {
                        let Some(row) = row.as_array() else { continue };
                        if row.len() < 3 {
                            continue;
                        }
                        let price_str = value_to_string(&row[0]);
                        let amount_val = row[2].as_f64().unwrap_or(0.0);
                        let amount_str = value_to_string(&row[2]);
                        if amount_val > 0.0 {
                            bids.push((price_str, amount_str));
                        } else {
                            asks.push((price_str, amount_str));
                        }
                    }
                    batch.snapshots.push(BookSnapshot {
                        event_time_ms: 0,
                        bids,
                        asks,
                        last_update_id: None,
                        checksum: None,
                        raw: Some(serde_json::json!({"type": "snapshot"})),
                    });
                    return;
                }
            }
        }

        // Update: [chanId, [price, count, amount]] or [chanId, price, count, amount]
        let triple = if arr.len() == 2 {
            arr[1].as_array().filter(|row| row.len() >= 3 && !row[0].is_array()).map(|row| {
                (row[0].clone(), row[1].as_i64().unwrap_or(0), row[2].clone())
            })
        } else if arr.len() >= 4 {
            Some((arr[1].clone(), arr[2].as_i64().unwrap_or(0), arr[3].clone()))
        } else {
            None
        };

        let Some((price_v, count, amount_v)) = triple else { return };
        let price_str = value_to_string(&price_v);
        let amount_val = amount_v.as_f64().unwrap_or(0.0);

        let (bids, asks) = if count == 0 {
            // Deletion: side comes from the sign Bitfinex still reports, qty is zero.
            if amount_val < 0.0 {
                (vec![], vec![(price_str, "0".to_string())])
            } else {
                (vec![(price_str, "0".to_string())], vec![])
            }
        } else if amount_val > 0.0 {
            (vec![(price_str, value_to_string(&amount_v))], vec![])
        } else {
            (vec![], vec![(price_str, value_to_string(&amount_v))])
        };

        batch.diffs.push(DepthDiff {
            event_time_ms: 0,
            u_start: 0,
            u_end: 0,
            bids,
            asks,
            checksum: None,
            raw: Some(serde_json::json!({"type": "update"})),
        });
    }

    fn parse_trades_frame(&self, arr: &[Value], batch: &mut ParsedBatch) {
        if arr.len() < 2 || arr[1].as_str() == Some("hb") {
            return;
        }

        // Snapshot: [chanId, [[trade_id, mts, amount, price], ...]]
        if arr.len() == 2 {
            if let Some(rows) = arr[1].as_array() {
                for entry in rows {
                    let Some(e) = entry.as_array() else { continue };
                    if e.len() < 4 {
                        continue;
                    }
                    push_trade(batch, &e[0], &e[1], &e[2], &e[3], entry.clone());
                }
            }
            return;
        }

        // Updates: [chanId, "te"|"tu", trade_id, mts, amount, price]. Only "tu" is final.
        if arr.len() >= 6 && arr[1].as_str() == Some("tu") {
            push_trade(batch, &arr[2], &arr[3], &arr[4], &arr[5], Value::Array(arr.to_vec()));
        }
    }
}

fn push_trade(batch: &mut ParsedBatch, trade_id: &Value, ts: &Value, amount: &Value, price: &Value, raw: Value) {
    let amount_val = amount.as_f64().unwrap_or(0.0);
    let trade_time_ms = to_ms(ts.as_f64().unwrap_or(0.0));
    batch.trades.push(Trade {
        event_time_ms: trade_time_ms,
        trade_id: trade_id.as_i64().unwrap_or(0),
        trade_time_ms,
        price: price.as_f64().unwrap_or(0.0),
        qty: amount_val.abs(),
        is_buyer_maker: amount_val <= 0.0,
        side: Some(if amount_val > 0.0 { "buy" } else { "sell" }.to_string()),
        ord_type: None,
        raw: Some(raw),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_symbol_with_lowercase_t_prefix() {
        let adapter = BitfinexAdapter::new();
        assert_eq!(adapter.normalize_symbol("BTC/USD"), "tBTCUSD");
        assert_eq!(adapter.normalize_symbol("tBTCUSD"), "tBTCUSD");
    }

    #[test]
    fn learns_channel_ids_from_subscribed_event() {
        let mut adapter = BitfinexAdapter::new();
        adapter.parse_message(&json!({"event":"subscribed","channel":"book","chanId":17}))
            .unwrap();
        adapter.parse_message(&json!({"event":"subscribed","channel":"trades","chanId":18}))
            .unwrap();
        assert_eq!(adapter.book_chan_id, Some(17));
        assert_eq!(adapter.trades_chan_id, Some(18));
    }

    #[test]
    fn parses_book_snapshot_splitting_by_amount_sign() {
        let mut adapter = BitfinexAdapter::new();
        adapter.book_chan_id = Some(17);
        let frame = json!([17, [["100.0", 1, "1.5"], ["101.0", 2, "-2.0"]]]);
        let batch = adapter.parse_message(&frame).unwrap();
        assert_eq!(batch.snapshots.len(), 1);
        assert_eq!(batch.snapshots[0].bids, vec![("100.0".to_string(), "1.5".to_string())]);
        assert_eq!(batch.snapshots[0].asks, vec![("101.0".to_string(), "-2.0".to_string())]);
    }

    #[test]
    fn parses_deletion_update_as_zero_qty() {
        let mut adapter = BitfinexAdapter::new();
        adapter.book_chan_id = Some(17);
        let frame = json!([17, ["100.0", 0, "-1.0"]]);
        let batch = adapter.parse_message(&frame).unwrap();
        assert_eq!(batch.diffs.len(), 1);
        assert_eq!(batch.diffs[0].asks, vec![("100.0".to_string(), "0".to_string())]);
        assert!(batch.diffs[0].bids.is_empty());
    }

    #[test]
    fn parses_checksum_frame_as_signed_bit_pattern() {
        let mut adapter = BitfinexAdapter::new();
        adapter.book_chan_id = Some(17);
        let frame = json!([17, "cs", -1]);
        let batch = adapter.parse_message(&frame).unwrap();
        assert_eq!(batch.diffs[0].checksum, Some(u32::MAX));
    }

    #[test]
    fn parses_trade_update_only_on_tu() {
        let mut adapter = BitfinexAdapter::new();
        adapter.trades_chan_id = Some(18);
        let te = json!([18, "te", 1, 1000.0, -0.5, 100.0]);
        assert!(adapter.parse_message(&te).unwrap().trades.is_empty());

        let tu = json!([18, "tu", 1, 1000.0, -0.5, 100.0]);
        let batch = adapter.parse_message(&tu).unwrap();
        assert_eq!(batch.trades.len(), 1);
        assert_eq!(batch.trades[0].resolved_side(), "sell");
        assert_eq!(batch.trades[0].qty, 0.5);
    }
}
