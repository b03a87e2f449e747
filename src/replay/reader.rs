//! Readers for the persisted per-day artifacts (spec §4.6/§6.2), grounded on
//! `mm/backtest/io.py`'s `iter_depth_diffs`/`iter_trades_csv`/`iter_events_csv`
//! and `mm/backtest/replay.py::load_snapshot_csv`.
//!
//! Every reader is a plain `Iterator` over a gzip-wrapped file so the merge
//! in [`super::merge`] can pull one record at a time without loading a whole
//! day into memory.

use crate::error::CoreError;
use crate::model::{BookSnapshot, Trade};
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One row of `events_*.csv.gz` (spec §6.2), with `details_json` already parsed.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event_id: u64,
    pub recv_time_ms: i64,
    pub recv_seq: u64,
    pub run_id: u64,
    pub event_type: String,
    pub epoch_id: u64,
    pub details: Value,
}

#[derive(Debug, Deserialize)]
struct EventRowCsv {
    event_id: u64,
    recv_time_ms: i64,
    recv_seq: u64,
    run_id: u64,
    #[serde(rename = "type")]
    event_type: String,
    epoch_id: u64,
    details_json: String,
}

pub struct EventReader {
    inner: csv::DeserializeRecordsIntoIter<MultiGzDecoder<File>, EventRowCsv>,
}

impl EventReader {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path)?;
        let reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
        Ok(Self { inner: reader.into_deserialize() })
    }
}

impl Iterator for EventReader {
    type Item = Result<EventRecord, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.inner.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(CoreError::ParseError(format!("malformed events row: {e}")))),
        };
        let details = if row.details_json.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&row.details_json).unwrap_or(Value::Null)
        };
        Some(Ok(EventRecord {
            event_id: row.event_id,
            recv_time_ms: row.recv_time_ms,
            recv_seq: row.recv_seq,
            run_id: row.run_id,
            event_type: row.event_type,
            epoch_id: row.epoch_id,
            details,
        }))
    }
}

/// One line of `diffs/depth_diffs_*.ndjson.gz`: `{recv_ms, recv_seq, E, U, u,
/// b, a, [checksum], exchange, symbol, [raw]}` (spec §6.2).
#[derive(Debug, Clone)]
pub struct DepthRecord {
    pub recv_ms: i64,
    pub recv_seq: Option<u64>,
    pub event_time_ms: i64,
    pub u_start: u64,
    pub u_end: u64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
    pub checksum: Option<u32>,
    pub raw: Option<Value>,
}

pub struct DepthDiffReader {
    lines: std::io::Lines<BufReader<MultiGzDecoder<File>>>,
}

impl DepthDiffReader {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path)?;
        let reader = BufReader::new(MultiGzDecoder::new(file));
        Ok(Self { lines: reader.lines() })
    }
}

fn level_list(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(arr) = value.and_then(|v| v.as_array()) else { return Vec::new() };
    arr.iter()
        .filter_map(|lv| {
            let pair = lv.as_array()?;
            Some((crate::adapter::value_to_string(pair.first()?), crate::adapter::value_to_string(pair.get(1)?)))
        })
        .collect()
}

impl Iterator for DepthDiffReader {
    type Item = Result<DepthRecord, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(CoreError::Io(e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => return Some(Err(CoreError::ParseError(format!("malformed depth diff line: {e}")))),
            };
            let recv_ms = value.get("recv_ms").and_then(|v| v.as_i64()).unwrap_or(0);
            let recv_seq = value.get("recv_seq").and_then(|v| v.as_u64());
            let event_time_ms = value.get("E").and_then(|v| v.as_i64()).unwrap_or(0);
            let u_start = value.get("U").and_then(|v| v.as_u64()).unwrap_or(0);
            let u_end = value.get("u").and_then(|v| v.as_u64()).unwrap_or(0);
            let checksum = value.get("checksum").and_then(|v| v.as_u64()).map(|c| c as u32);
            let raw = value.get("raw").cloned();
            return Some(Ok(DepthRecord {
                recv_ms,
                recv_seq,
                event_time_ms,
                u_start,
                u_end,
                bids: level_list(value.get("b")),
                asks: level_list(value.get("a")),
                checksum,
                raw,
            }));
        }
    }
}

/// One row of `trades_*.csv.gz` (spec §6.2).
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub event_time_ms: i64,
    pub recv_time_ms: i64,
    pub recv_seq: Option<u64>,
    pub run_id: u64,
    pub trade_id: i64,
    pub trade_time_ms: i64,
    pub price: f64,
    pub qty: f64,
    pub is_buyer_maker: bool,
    pub side: Option<String>,
    pub ord_type: Option<String>,
    pub exchange: String,
    pub symbol: String,
}

impl TradeRecord {
    pub fn as_trade(&self) -> Trade {
        Trade {
            event_time_ms: self.event_time_ms,
            trade_id: self.trade_id,
            trade_time_ms: self.trade_time_ms,
            price: self.price,
            qty: self.qty,
            is_buyer_maker: self.is_buyer_maker,
            side: self.side.clone(),
            ord_type: self.ord_type.clone(),
            raw: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TradeRowCsv {
    event_time_ms: i64,
    recv_time_ms: i64,
    recv_seq: String,
    run_id: u64,
    trade_id: i64,
    trade_time_ms: i64,
    price: f64,
    qty: f64,
    is_buyer_maker: bool,
    side: String,
    ord_type: String,
    exchange: String,
    symbol: String,
}

pub struct TradeReader {
    inner: csv::DeserializeRecordsIntoIter<MultiGzDecoder<File>, TradeRowCsv>,
}

impl TradeReader {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path)?;
        let reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
        Ok(Self { inner: reader.into_deserialize() })
    }
}

impl Iterator for TradeReader {
    type Item = Result<TradeRecord, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.inner.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(CoreError::ParseError(format!("malformed trades row: {e}")))),
        };
        Some(Ok(TradeRecord {
            event_time_ms: row.event_time_ms,
            recv_time_ms: row.recv_time_ms,
            recv_seq: row.recv_seq.parse().ok(),
            run_id: row.run_id,
            trade_id: row.trade_id,
            trade_time_ms: row.trade_time_ms,
            price: row.price,
            qty: row.qty,
            is_buyer_maker: row.is_buyer_maker,
            side: if row.side.is_empty() { None } else { Some(row.side) },
            ord_type: if row.ord_type.is_empty() { None } else { Some(row.ord_type) },
            exchange: row.exchange,
            symbol: row.symbol,
        }))
    }
}

/// `snapshots/snapshot_<event_id>_<tag>.csv`: `run_id, event_id, side, price,
/// qty, lastUpdateId[, checksum]` (spec §6.2), read back into a [`BookSnapshot`].
pub fn load_snapshot_csv(path: &Path) -> Result<BookSnapshot, CoreError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let side_idx = headers.iter().position(|h| h == "side").ok_or_else(|| CoreError::ParseError("snapshot csv missing side column".into()))?;
    let price_idx = headers.iter().position(|h| h == "price").ok_or_else(|| CoreError::ParseError("snapshot csv missing price column".into()))?;
    let qty_idx = headers.iter().position(|h| h == "qty").ok_or_else(|| CoreError::ParseError("snapshot csv missing qty column".into()))?;
    let last_update_idx = headers.iter().position(|h| h == "lastUpdateId");
    let checksum_idx = headers.iter().position(|h| h == "checksum");

    let mut bids = Vec::new();
    let mut asks = Vec::new();
    let mut last_update_id = None;
    let mut checksum = None;

    for result in reader.records() {
        let record = result?;
        let side = record.get(side_idx).unwrap_or("");
        let price = record.get(price_idx).unwrap_or("0").to_string();
        let qty = record.get(qty_idx).unwrap_or("0").to_string();
        match side {
            "bid" => bids.push((price, qty)),
            "ask" => asks.push((price, qty)),
            _ => {}
        }
        if let Some(idx) = last_update_idx {
            if let Some(v) = record.get(idx).filter(|s| !s.is_empty()) {
                last_update_id = v.parse().ok();
            }
        }
        if let Some(idx) = checksum_idx {
            if let Some(v) = record.get(idx).filter(|s| !s.is_empty()) {
                checksum = v.parse().ok();
            }
        }
    }

    Ok(BookSnapshot { event_time_ms: 0, bids, asks, last_update_id, checksum, raw: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::persistence::{GzCsvWriter, GzLineWriter};
    use std::time::Duration;

    #[test]
    fn event_reader_roundtrips_a_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv.gz");
        let mut w = GzCsvWriter::create(&path, &["event_id", "recv_time_ms", "recv_seq", "run_id", "type", "epoch_id", "details_json"], 10, Duration::from_secs(10)).unwrap();
        w.write_row(["1", "1000", "5", "7", "run_start", "0", "{\"k\":1}"]).unwrap();
        w.close().unwrap();

        let mut reader = EventReader::open(&path).unwrap();
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.event_id, 1);
        assert_eq!(row.recv_seq, 5);
        assert_eq!(row.event_type, "run_start");
        assert_eq!(row.details, serde_json::json!({"k": 1}));
        assert!(reader.next().is_none());
    }

    #[test]
    fn depth_diff_reader_parses_ndjson_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diffs.ndjson.gz");
        let mut w = GzLineWriter::create(&path, 10, Duration::from_secs(10)).unwrap();
        w.write_line(r#"{"recv_ms":1000,"recv_seq":3,"E":900,"U":10,"u":11,"b":[["100","1"]],"a":[]}"#).unwrap();
        w.close().unwrap();

        let mut reader = DepthDiffReader::open(&path).unwrap();
        let row = reader.next().unwrap().unwrap();
        assert_eq!(row.recv_seq, Some(3));
        assert_eq!((row.u_start, row.u_end), (10, 11));
        assert_eq!(row.bids, vec![("100".to_string(), "1".to_string())]);
    }

    #[test]
    fn snapshot_csv_loads_bids_and_asks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot_000001_initial.csv");
        std::fs::write(&path, "run_id,event_id,side,price,qty,lastUpdateId\n1,1,bid,100.0,1.0,10\n1,1,ask,101.0,2.0,10\n").unwrap();
        let snapshot = load_snapshot_csv(&path).unwrap();
        assert_eq!(snapshot.last_update_id, Some(10));
        assert_eq!(snapshot.bids, vec![("100.0".to_string(), "1.0".to_string())]);
        assert_eq!(snapshot.asks, vec![("101.0".to_string(), "2.0".to_string())]);
    }
}
