//! `inspect coverage` — report per-file row counts, time spans, and detected
//! gaps for a recorded day, grounded on `scripts/check_market_data_coverage.py`.
//!
//! The original inferred an expected cadence from the median positive
//! timestamp delta in a single CSV and flagged intervals at least
//! `max(2.5x cadence, min_gap_s)` as gaps; the same estimator is applied here
//! to each of the three bit-exact ledgers, plus the epoch/resync counters the
//! recorder itself already tracks in `events_*.csv.gz` and `gaps_*.csv.gz`
//! (which the original script, written before those files existed, had no
//! way to read).

use crate::error::CoreError;
use crate::recorder::persistence::{DayLayout, LedgerPaths, Schema};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::path::{Path, PathBuf};

const DEFAULT_MIN_GAP_S: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct FileCoverage {
    pub kind: &'static str,
    pub path: PathBuf,
    pub exists: bool,
    pub n_rows: usize,
    pub first_ms: Option<i64>,
    pub last_ms: Option<i64>,
    pub inferred_expected_ms: Option<f64>,
    /// `(start_ms, end_ms)` pairs, longest first.
    pub gaps: Vec<(i64, i64)>,
}

fn analyze_gz_csv(path: &Path, kind: &'static str, time_col: &str, min_gap_s: f64) -> Result<FileCoverage, CoreError> {
    if !path.exists() {
        return Ok(FileCoverage { kind, path: path.to_path_buf(), exists: false, n_rows: 0, first_ms: None, last_ms: None, inferred_expected_ms: None, gaps: Vec::new() });
    }

    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
    let headers = reader.headers()?.clone();
    let Some(col_idx) = headers.iter().position(|h| h == time_col) else {
        return Ok(FileCoverage { kind, path: path.to_path_buf(), exists: true, n_rows: 0, first_ms: None, last_ms: None, inferred_expected_ms: None, gaps: Vec::new() });
    };

    let mut timestamps = Vec::new();
    for result in reader.records() {
        let record = result?;
        if let Some(v) = record.get(col_idx).and_then(|s| s.parse::<i64>().ok()) {
            timestamps.push(v);
        }
    }
    let n_rows = timestamps.len();
    if n_rows == 0 {
        return Ok(FileCoverage { kind, path: path.to_path_buf(), exists: true, n_rows: 0, first_ms: None, last_ms: None, inferred_expected_ms: None, gaps: Vec::new() });
    }

    timestamps.sort_unstable();
    timestamps.dedup();
    let first_ms = timestamps.first().copied();
    let last_ms = timestamps.last().copied();

    let deltas: Vec<i64> = timestamps.windows(2).map(|w| w[1] - w[0]).filter(|d| *d > 0).collect();
    let expected_ms = median(&deltas);

    let gaps = match expected_ms {
        Some(expected) if expected > 0.0 => {
            let threshold = ((expected * 2.5).max(min_gap_s * 1000.0)) as i64;
            timestamps.windows(2).filter(|w| w[1] - w[0] >= threshold).map(|w| (w[0], w[1])).collect()
        }
        _ => Vec::new(),
    };

    Ok(FileCoverage { kind, path: path.to_path_buf(), exists: true, n_rows, first_ms, last_ms, inferred_expected_ms: expected_ms, gaps })
}

fn median(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) as f64 / 2.0 } else { sorted[mid] as f64 })
}

fn count_data_rows(path: &Path) -> Result<u64, CoreError> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
    Ok(reader.records().count() as u64)
}

fn max_epoch_id(path: &Path) -> Result<u64, CoreError> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
    let headers = reader.headers()?.clone();
    let Some(idx) = headers.iter().position(|h| h == "epoch_id") else { return Ok(0) };
    let mut max_epoch = 0u64;
    for result in reader.records() {
        let record = result?;
        if let Some(v) = record.get(idx).and_then(|s| s.parse::<u64>().ok()) {
            max_epoch = max_epoch.max(v);
        }
    }
    Ok(max_epoch)
}

#[derive(Debug, Clone)]
pub struct CoverageReport {
    pub exchange: String,
    pub symbol: String,
    pub day: String,
    pub files: Vec<FileCoverage>,
    /// Number of sync epochs the recorder went through (1 + resync count).
    pub epoch_count: u64,
    /// Rows in `gaps_*.csv.gz`: gaps the recorder itself flagged live.
    pub recorder_gap_count: u64,
}

pub fn coverage_day(day_dir: &Path) -> Result<CoverageReport, CoreError> {
    let schema = Schema::read(day_dir)?;
    let day = day_dir.file_name().and_then(|s| s.to_str()).ok_or_else(|| CoreError::Fatal(format!("cannot infer day from path {}", day_dir.display())))?.to_string();
    let layout = DayLayout::from_existing(day_dir);
    let paths = LedgerPaths::new(&layout, &schema.symbol_fs, &day);

    let files = vec![
        analyze_gz_csv(&paths.orderbook_csv, "orderbook", "recv_time_ms", DEFAULT_MIN_GAP_S)?,
        analyze_gz_csv(&paths.trades_csv, "trades", "event_time_ms", DEFAULT_MIN_GAP_S)?,
        analyze_gz_csv(&paths.events_csv, "events", "recv_time_ms", DEFAULT_MIN_GAP_S)?,
    ];

    let epoch_count = max_epoch_id(&paths.events_csv)? + 1;
    let recorder_gap_count = count_data_rows(&paths.gaps_csv)?;

    Ok(CoverageReport { exchange: schema.exchange, symbol: schema.symbol, day, files, epoch_count, recorder_gap_count })
}
