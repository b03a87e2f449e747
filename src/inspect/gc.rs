//! `inspect gc` — drop rows outside a day's own `[00:00, +1d)` window from
//! its CSV/NDJSON ledgers, grounded on `scripts/purge_non_day_data.py`.
//!
//! That script existed to repair a recorder that kept running past
//! midnight and kept appending into the startup day's directory; the same
//! contamination is possible here if a run's reconnect loop outlives its
//! configured window. Detection and rewrite-in-place logic both follow the
//! original: filter by the first matching timestamp column/key, rewrite
//! through a `.tmp` sibling, then replace, deleting the file entirely if
//! nothing survives the filter.
//!
//! Unlike the original, this crate's snapshot files are named
//! `snapshot_<event_id>_<tag>.csv` rather than `snapshot_<recv_ms>_<tag>.csv`
//! (see [`crate::recorder::persistence::LedgerPaths::snapshot_path`]), so
//! there is no timestamp to filter them by; they are left untouched here and
//! rely on the events ledger (which *is* filtered) remaining the source of
//! truth for which ones are still referenced.

use crate::error::CoreError;
use crate::recorder::persistence::{DayLayout, LedgerPaths, Schema};
use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

const CSV_TIME_COL_CANDIDATES: [&str; 2] = ["recv_time_ms", "event_time_ms"];
const NDJSON_TIME_KEY_CANDIDATES: [&str; 2] = ["recv_ms", "recv_time_ms"];

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: &'static str,
    pub total: usize,
    pub kept: usize,
    pub reason: String,
}

impl FileReport {
    fn removed(&self) -> usize {
        self.total - self.kept
    }
}

/// `path` with `.tmp` appended to its full filename (not `Path::with_extension`,
/// which would clobber the `.gz` suffix instead of extending it).
fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// `[start_ms, end_ms)` for `day` (`YYYYMMDD`) at midnight in `tz`, mirroring
/// `purge_non_day_data.py::_day_bounds_ms`.
pub fn day_bounds_ms(day: &str, tz: Tz) -> Result<(i64, i64), CoreError> {
    if day.len() != 8 || !day.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::Fatal(format!("day must be YYYYMMDD (got {day:?})")));
    }
    let year: i32 = day[0..4].parse().map_err(|_| CoreError::Fatal(format!("bad year in day {day:?}")))?;
    let month: u32 = day[4..6].parse().map_err(|_| CoreError::Fatal(format!("bad month in day {day:?}")))?;
    let dom: u32 = day[6..8].parse().map_err(|_| CoreError::Fatal(format!("bad day-of-month in day {day:?}")))?;
    let naive_date = NaiveDate::from_ymd_opt(year, month, dom).ok_or_else(|| CoreError::Fatal(format!("invalid calendar date in day {day:?}")))?;
    let start_naive = naive_date.and_hms_opt(0, 0, 0).unwrap();
    let start = tz.from_local_datetime(&start_naive).single().unwrap_or_else(|| tz.from_utc_datetime(&start_naive));
    let end = start + chrono::Duration::days(1);
    Ok((start.timestamp_millis(), end.timestamp_millis()))
}

fn filter_csv_gz(path: &Path, kind: &'static str, start_ms: i64, end_ms: i64, write: bool) -> Result<FileReport, CoreError> {
    if !path.exists() {
        return Ok(FileReport { path: path.to_path_buf(), kind, total: 0, kept: 0, reason: "missing".into() });
    }

    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(MultiGzDecoder::new(file));
    let headers = reader.headers()?.clone();
    let Some(col_idx) = headers.iter().position(|h| CSV_TIME_COL_CANDIDATES.contains(&h)) else {
        return Ok(FileReport { path: path.to_path_buf(), kind, total: 0, kept: 0, reason: "no_timestamp_column_found".into() });
    };
    let time_col = headers.get(col_idx).unwrap_or_default().to_string();

    let tmp_path = tmp_sibling(path);
    let mut out_writer = if write {
        let out_file = File::create(&tmp_path)?;
        let encoder = GzEncoder::new(out_file, Compression::default());
        let mut w = csv::Writer::from_writer(encoder);
        w.write_record(headers.iter())?;
        Some(w)
    } else {
        None
    };

    let mut total = 0usize;
    let mut kept = 0usize;
    for result in reader.records() {
        let record = result?;
        total += 1;
        let ts: Option<i64> = record.get(col_idx).and_then(|s| s.parse().ok());
        let in_day = ts.map(|t| t >= start_ms && t < end_ms).unwrap_or(false);
        if in_day {
            kept += 1;
            if let Some(w) = out_writer.as_mut() {
                w.write_record(record.iter())?;
            }
        }
    }

    if let Some(w) = out_writer {
        let encoder = w.into_inner().map_err(|e| CoreError::Fatal(e.to_string()))?;
        encoder.finish()?;
        if kept == 0 {
            let _ = std::fs::remove_file(&tmp_path);
            std::fs::remove_file(path)?;
        } else {
            std::fs::rename(&tmp_path, path)?;
        }
    }

    let reason = if total == 0 {
        "no_rows".to_string()
    } else if total == kept {
        "clean".to_string()
    } else {
        format!("removed_rows_outside_day({time_col})")
    };
    Ok(FileReport { path: path.to_path_buf(), kind, total, kept, reason })
}

fn filter_ndjson_gz(path: &Path, kind: &'static str, start_ms: i64, end_ms: i64, write: bool) -> Result<FileReport, CoreError> {
    if !path.exists() {
        return Ok(FileReport { path: path.to_path_buf(), kind, total: 0, kept: 0, reason: "missing".into() });
    }

    let file = File::open(path)?;
    let lines = BufReader::new(MultiGzDecoder::new(file)).lines();

    let tmp_path = tmp_sibling(path);
    let mut out_encoder = if write { Some(GzEncoder::new(File::create(&tmp_path)?, Compression::default())) } else { None };

    let mut total = 0usize;
    let mut kept = 0usize;
    let mut key_used: Option<&'static str> = None;

    for line in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        total += 1;
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else { continue };
        if key_used.is_none() {
            key_used = NDJSON_TIME_KEY_CANDIDATES.iter().copied().find(|k| value.get(k).is_some());
        }
        let ts = key_used.and_then(|k| value.get(k)).and_then(|v| v.as_i64());
        let in_day = ts.map(|t| t >= start_ms && t < end_ms).unwrap_or(false);
        if in_day {
            kept += 1;
            if let Some(enc) = out_encoder.as_mut() {
                enc.write_all(line.as_bytes())?;
                enc.write_all(b"\n")?;
            }
        }
    }

    if let Some(enc) = out_encoder {
        enc.finish()?;
        if kept == 0 {
            let _ = std::fs::remove_file(&tmp_path);
            std::fs::remove_file(path)?;
        } else {
            std::fs::rename(&tmp_path, path)?;
        }
    }

    let reason = if total == 0 {
        "no_lines".to_string()
    } else if total == kept {
        "clean".to_string()
    } else {
        format!("removed_lines_outside_day({})", key_used.unwrap_or("unknown"))
    };
    Ok(FileReport { path: path.to_path_buf(), kind, total, kept, reason })
}

#[derive(Debug, Clone)]
pub struct GcReport {
    pub day_dir: PathBuf,
    pub start_ms: i64,
    pub end_ms: i64,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

impl GcReport {
    pub fn total_removed(&self) -> usize {
        self.files.iter().map(|f| f.removed()).sum()
    }

    pub fn total_kept(&self) -> usize {
        self.files.iter().map(|f| f.kept).sum()
    }

    pub fn affected(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.removed() > 0)
    }
}

pub fn gc_day(day_dir: &Path, tz_name: &str, dry_run: bool) -> Result<GcReport, CoreError> {
    let tz: Tz = tz_name.parse().map_err(|_| CoreError::Fatal(format!("unknown timezone {tz_name:?}")))?;
    let day = day_dir.file_name().and_then(|s| s.to_str()).ok_or_else(|| CoreError::Fatal(format!("cannot infer day from path {}", day_dir.display())))?.to_string();
    let (start_ms, end_ms) = day_bounds_ms(&day, tz)?;

    let schema = Schema::read(day_dir)?;
    let layout = DayLayout::from_existing(day_dir);
    let paths = LedgerPaths::new(&layout, &schema.symbol_fs, &day);
    let write = !dry_run;

    let files = vec![
        filter_csv_gz(&paths.orderbook_csv, "orderbook", start_ms, end_ms, write)?,
        filter_csv_gz(&paths.trades_csv, "trades", start_ms, end_ms, write)?,
        filter_csv_gz(&paths.gaps_csv, "gaps", start_ms, end_ms, write)?,
        filter_csv_gz(&paths.events_csv, "events", start_ms, end_ms, write)?,
        filter_ndjson_gz(&paths.depth_diffs_ndjson, "depth_diffs", start_ms, end_ms, write)?,
        filter_ndjson_gz(&paths.trades_raw_ndjson, "trades_raw", start_ms, end_ms, write)?,
    ];

    Ok(GcReport { day_dir: day_dir.to_path_buf(), start_ms, end_ms, dry_run, files })
}
