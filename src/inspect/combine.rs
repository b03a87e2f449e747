//! `inspect combine` — fold a recorded day's trades into OHLCV candles,
//! grounded on `mm_history/combiner.py`. That module reconciled locally
//! recorded trades against candles fetched from an exchange's REST history
//! endpoint; this crate has no such HTTP client (spec's Non-goals exclude a
//! historical-candle fetcher), so `combine_day` folds local trades into
//! whatever `history/candles_<interval>_<symbol>_<day>.csv.gz` already
//! exists for the bucket, with freshly recorded trades always winning a
//! conflict — the same precedence `combiner.py::merge_candles` gives local
//! data over remote.

use crate::error::CoreError;
use crate::model::Trade;
use crate::recorder::persistence::{DayLayout, LedgerPaths, Schema};
use crate::replay::reader::TradeReader;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

fn candles_equal(a: &Candle, b: &Candle) -> bool {
    a.open == b.open && a.high == b.high && a.low == b.low && a.close == b.close && a.volume == b.volume
}

/// Bucket width in milliseconds for each supported interval string. Mirrors
/// `combiner.py::_INTERVAL_MS` (month is treated as a flat 30 days there too).
pub fn interval_ms(interval: &str) -> Result<i64, CoreError> {
    Ok(match interval {
        "1s" => 1_000,
        "1m" => 60_000,
        "5m" => 300_000,
        "15m" => 900_000,
        "30m" => 1_800_000,
        "1h" => 3_600_000,
        "3h" => 10_800_000,
        "6h" => 21_600_000,
        "12h" => 43_200_000,
        "1d" | "1D" => 86_400_000,
        "1w" | "1W" => 604_800_000,
        "14D" => 1_209_600_000,
        "1M" => 2_592_000_000,
        other => return Err(CoreError::Fatal(format!("unsupported candle interval {other:?}"))),
    })
}

fn bucket_start(ts_ms: i64, step_ms: i64) -> i64 {
    (ts_ms.div_euclid(step_ms)) * step_ms
}

/// Bucket a stream of trades into candles (`combiner.py::build_candles_from_trades`).
pub fn build_candles_from_trades(trades: impl Iterator<Item = Trade>, step_ms: i64) -> Vec<Candle> {
    let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();
    for trade in trades {
        let bucket = bucket_start(trade.event_time_ms, step_ms);
        buckets
            .entry(bucket)
            .and_modify(|c| {
                c.close = trade.price;
                c.high = c.high.max(trade.price);
                c.low = c.low.min(trade.price);
                c.volume += trade.qty;
            })
            .or_insert(Candle { ts_ms: bucket, open: trade.price, high: trade.price, low: trade.price, close: trade.price, volume: trade.qty });
    }
    buckets.into_values().collect()
}

/// Merge locally-built candles over any pre-existing ones for the same
/// bucket, logging (not failing on) a mismatch — mirrors
/// `combiner.py::merge_candles`'s `log.error` on disagreement.
pub fn merge_candles(local: Vec<Candle>, remote: Vec<Candle>) -> Vec<Candle> {
    let mut merged: BTreeMap<i64, Candle> = BTreeMap::new();
    for candle in remote {
        merged.insert(candle.ts_ms, candle);
    }
    for candle in local {
        if let Some(existing) = merged.get(&candle.ts_ms) {
            if !candles_equal(&candle, existing) {
                tracing::error!(ts_ms = candle.ts_ms, local = ?candle, remote = ?existing, "candle mismatch between recorded trades and existing history file");
            }
        }
        merged.insert(candle.ts_ms, candle);
    }
    merged.into_values().collect()
}

const CANDLE_HEADER: [&str; 6] = ["ts_ms", "open", "high", "low", "close", "volume"];

fn read_candles_csv_gz(path: &Path) -> Result<Vec<Candle>, CoreError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
    let mut out = Vec::new();
    for result in reader.records() {
        let record = result?;
        out.push(Candle {
            ts_ms: record.get(0).unwrap_or("0").parse().unwrap_or(0),
            open: record.get(1).unwrap_or("0").parse().unwrap_or(0.0),
            high: record.get(2).unwrap_or("0").parse().unwrap_or(0.0),
            low: record.get(3).unwrap_or("0").parse().unwrap_or(0.0),
            close: record.get(4).unwrap_or("0").parse().unwrap_or(0.0),
            volume: record.get(5).unwrap_or("0").parse().unwrap_or(0.0),
        });
    }
    Ok(out)
}

fn write_candles_csv_gz(path: &Path, candles: &[Candle]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);
    writer.write_record(CANDLE_HEADER)?;
    for c in candles {
        writer.write_record([c.ts_ms.to_string(), c.open.to_string(), c.high.to_string(), c.low.to_string(), c.close.to_string(), c.volume.to_string()])?;
    }
    writer.flush()?;
    let encoder = writer.into_inner().map_err(|e| CoreError::Fatal(e.to_string()))?;
    encoder.finish()?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CombineReport {
    pub interval: String,
    pub trades_read: u64,
    pub candles_written: usize,
    pub out_path: PathBuf,
}

pub fn combine_day(day_dir: &Path, interval: &str) -> Result<CombineReport, CoreError> {
    let schema = Schema::read(day_dir)?;
    let step_ms = interval_ms(interval)?;
    let day = day_dir.file_name().and_then(|s| s.to_str()).ok_or_else(|| CoreError::Fatal(format!("cannot infer day from path {}", day_dir.display())))?.to_string();

    let layout = DayLayout::from_existing(day_dir);
    let paths = LedgerPaths::new(&layout, &schema.symbol_fs, &day);

    let mut trades_read = 0u64;
    let local = if paths.trades_csv.exists() {
        let trades: Vec<Trade> = TradeReader::open(&paths.trades_csv)?
            .filter_map(|r| r.ok())
            .map(|r| {
                trades_read += 1;
                r.as_trade()
            })
            .collect();
        build_candles_from_trades(trades.into_iter(), step_ms)
    } else {
        Vec::new()
    };

    let out_path = day_dir.join("history").join(format!("candles_{interval}_{}_{day}.csv.gz", schema.symbol_fs));
    let remote = if out_path.exists() { read_candles_csv_gz(&out_path)? } else { Vec::new() };

    let merged = merge_candles(local, remote);
    write_candles_csv_gz(&out_path, &merged)?;

    Ok(CombineReport { interval: interval.to_string(), trades_read, candles_written: merged.len(), out_path })
}
