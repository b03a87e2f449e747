//! Binance adapter, grounded on `mm_recorder/exchanges/binance.py`. Combined
//! streams (`<sym>@depth@100ms/<sym>@trade`) deliver both depth and trade
//! frames wrapped in a `{"stream":...,"data":{...}}` envelope; dispatch is on
//! `data.e`.

use super::{value_to_string, ExchangeAdapter, ParsedBatch};
use crate::error::CoreError;
use crate::model::{DepthDiff, Trade};
use crate::sync::sequence::SequenceBridgeEngine;
use crate::sync::{SyncEngine, SyncMode};
use serde_json::Value;

pub struct BinanceAdapter;

impl ExchangeAdapter for BinanceAdapter {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Sequence
    }

    fn normalize_symbol(&self, symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    fn ws_url(&self, symbol: &str) -> String {
        let sym = self.normalize_symbol(symbol).to_lowercase();
        format!("wss://stream.binance.com:9443/stream?streams={sym}@depth@100ms/{sym}@trade")
    }

    fn subscribe_messages(&self, _symbol: &str, _depth: usize) -> Vec<Value> {
        Vec::new()
    }

    fn create_sync_engine(&self, _depth: usize, max_buffer_size: usize) -> Box<dyn SyncEngine + Send> {
        Box::new(SequenceBridgeEngine::new(max_buffer_size, None))
    }

    fn parse_message(&mut self, data: &Value) -> Result<ParsedBatch, CoreError> {
        let mut batch = ParsedBatch::default();
        let payload = data.get("data").unwrap_or(data);
        match payload.get("e").and_then(|v| v.as_str()) {
            Some("depthUpdate") => batch.diffs.push(parse_depth(payload)?),
            Some("trade") => batch.trades.push(parse_trade(payload)?),
            _ => {}
        }
        Ok(batch)
    }
}

fn level_list(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(arr) = value.and_then(|v| v.as_array()) else { return Vec::new() };
    arr.iter()
        .filter_map(|lv| {
            let pair = lv.as_array()?;
            Some((value_to_string(pair.first()?), value_to_string(pair.get(1)?)))
        })
        .collect()
}

fn parse_depth(data: &Value) -> Result<DepthDiff, CoreError> {
    Ok(DepthDiff {
        event_time_ms: data.get("E").and_then(|v| v.as_i64()).unwrap_or(0),
        u_start: data.get("U").and_then(|v| v.as_u64()).unwrap_or(0),
        u_end: data.get("u").and_then(|v| v.as_u64()).unwrap_or(0),
        bids: level_list(data.get("b")),
        asks: level_list(data.get("a")),
        checksum: None,
        raw: Some(data.clone()),
    })
}

fn parse_trade(data: &Value) -> Result<Trade, CoreError> {
    let is_buyer_maker = data.get("m").and_then(|v| v.as_bool()).unwrap_or(false);
    Ok(Trade {
        event_time_ms: data.get("E").and_then(|v| v.as_i64()).unwrap_or(0),
        trade_id: data.get("t").and_then(|v| v.as_i64()).unwrap_or(0),
        trade_time_ms: data.get("T").and_then(|v| v.as_i64()).unwrap_or(0),
        price: data.get("p").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0),
        qty: data.get("q").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()).unwrap_or(0.0),
        is_buyer_maker,
        side: None,
        ord_type: None,
        raw: Some(data.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ws_url_uses_lowercase_symbol_in_combined_stream() {
        let adapter = BinanceAdapter;
        assert_eq!(
            adapter.ws_url("btcusdt"),
            "wss://stream.binance.com:9443/stream?streams=btcusdt@depth@100ms/btcusdt@trade"
        );
    }

    #[test]
    fn parses_depth_update_envelope() {
        let mut adapter = BinanceAdapter;
        let frame = json!({
            "stream": "btcusdt@depth@100ms",
            "data": {"e":"depthUpdate","E":1000,"U":10,"u":12,"b":[["100.0","1.0"]],"a":[["101.0","2.0"]]}
        });
        let batch = adapter.parse_message(&frame).unwrap();
        assert_eq!(batch.diffs.len(), 1);
        let diff = &batch.diffs[0];
        assert_eq!((diff.u_start, diff.u_end), (10, 12));
        assert_eq!(diff.bids, vec![("100.0".to_string(), "1.0".to_string())]);
    }

    #[test]
    fn parses_trade_envelope() {
        let mut adapter = BinanceAdapter;
        let frame = json!({
            "stream": "btcusdt@trade",
            "data": {"e":"trade","E":1000,"t":5,"T":999,"p":"100.5","q":"0.1","m":true}
        });
        let batch = adapter.parse_message(&frame).unwrap();
        assert_eq!(batch.trades.len(), 1);
        assert!(batch.trades[0].is_buyer_maker);
        assert_eq!(batch.trades[0].resolved_side(), "sell");
    }
}
