//! REST snapshot fetch + CSV/JSON persistence for sequence exchanges, grounded
//! on `mm_recorder/snapshot.py`. Checksum exchanges (Kraken/Bitfinex) never
//! call this module — their snapshot arrives over the WS stream itself.

use crate::error::CoreError;
use crate::model::BookSnapshot;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

const SNAPSHOT_RETRY_MAX: u32 = 3;
const SNAPSHOT_RETRY_BACKOFF: Duration = Duration::from_millis(500);
const SNAPSHOT_RETRY_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Fetches `GET /api/v3/depth?symbol=..&limit=..` from Binance, retrying with
/// doubling backoff capped at `SNAPSHOT_RETRY_BACKOFF_MAX` (mirrors
/// `snapshot.py::_call_with_retry`). Only Binance needs this: it's the one
/// supported exchange whose sync discipline is sequence-bridging.
pub async fn fetch_binance_snapshot(client: &reqwest::Client, base_url: &str, symbol: &str, limit: usize) -> Result<BookSnapshot, CoreError> {
    let url = format!("{base_url}/api/v3/depth");
    let mut delay = SNAPSHOT_RETRY_BACKOFF;
    let mut last_err = None;

    for attempt in 1..=SNAPSHOT_RETRY_MAX {
        match fetch_once(client, &url, symbol, limit).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) => {
                last_err = Some(e);
                if attempt < SNAPSHOT_RETRY_MAX {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(SNAPSHOT_RETRY_BACKOFF_MAX);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| CoreError::SnapshotFetchFailed("unknown".into())))
}

async fn fetch_once(client: &reqwest::Client, url: &str, symbol: &str, limit: usize) -> Result<BookSnapshot, CoreError> {
    let resp = client
        .get(url)
        .query(&[("symbol", symbol), ("limit", &limit.to_string())])
        .send()
        .await
        .map_err(|e| CoreError::SnapshotFetchFailed(e.to_string()))?;
    let resp = resp.error_for_status().map_err(|e| CoreError::SnapshotFetchFailed(e.to_string()))?;
    let body: Value = resp.json().await.map_err(|e| CoreError::SnapshotFetchFailed(e.to_string()))?;
    parse_snapshot_payload(body)
}

fn parse_snapshot_payload(snap: Value) -> Result<BookSnapshot, CoreError> {
    let bids = levels(snap.get("bids"))?;
    let asks = levels(snap.get("asks"))?;
    let last_update_id = snap
        .get("lastUpdateId")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| CoreError::SnapshotFetchFailed("snapshot payload missing lastUpdateId".into()))?;
    Ok(BookSnapshot { event_time_ms: 0, bids, asks, last_update_id: Some(last_update_id), checksum: None, raw: Some(snap) })
}

fn levels(value: Option<&Value>) -> Result<Vec<(String, String)>, CoreError> {
    let arr = value.and_then(|v| v.as_array()).ok_or_else(|| CoreError::SnapshotFetchFailed("snapshot bids/asks must be lists".into()))?;
    arr.iter()
        .map(|lv| {
            let pair = lv.as_array().filter(|p| p.len() >= 2).ok_or_else(|| CoreError::SnapshotFetchFailed("malformed level".into()))?;
            Ok((crate::adapter::value_to_string(&pair[0]), crate::adapter::value_to_string(&pair[1])))
        })
        .collect()
}

/// `snapshots/snapshot_<event_id>_<tag>.csv`: sorted top-of-book rows
/// (bids descending, asks ascending), fixed to `decimals` digits.
pub fn write_snapshot_csv(
    path: &Path,
    run_id: u64,
    event_id: u64,
    snapshot: &BookSnapshot,
    decimals: usize,
) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["run_id", "event_id", "side", "price", "qty", "lastUpdateId"];
    if snapshot.checksum.is_some() {
        header.push("checksum");
    }
    writer.write_record(&header)?;

    let mut bids: Vec<(f64, f64)> = snapshot.bids.iter().filter_map(|(p, q)| Some((p.parse().ok()?, q.parse().ok()?))).collect();
    bids.sort_by(|a, b| b.0.total_cmp(&a.0));
    let mut asks: Vec<(f64, f64)> = snapshot.asks.iter().filter_map(|(p, q)| Some((p.parse().ok()?, q.parse().ok()?))).collect();
    asks.sort_by(|a, b| a.0.total_cmp(&b.0));

    for (side, rows) in [("bid", &bids), ("ask", &asks)] {
        for (price, qty) in rows.iter() {
            let mut row = vec![
                run_id.to_string(),
                event_id.to_string(),
                side.to_string(),
                format!("{price:.decimals$}"),
                format!("{qty:.decimals$}"),
                snapshot.last_update_id.unwrap_or(0).to_string(),
            ];
            if let Some(checksum) = snapshot.checksum {
                row.push(checksum.to_string());
            }
            writer.write_record(&row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_snapshot_json(path: &Path, raw: &Value) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    serde_json::to_writer(file, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_valid_snapshot_payload() {
        let payload = json!({"lastUpdateId": 100, "bids": [["10.0","1.0"]], "asks": [["11.0","2.0"]]});
        let snapshot = parse_snapshot_payload(payload).unwrap();
        assert_eq!(snapshot.last_update_id, Some(100));
        assert_eq!(snapshot.bids, vec![("10.0".to_string(), "1.0".to_string())]);
    }

    #[test]
    fn rejects_payload_missing_last_update_id() {
        let payload = json!({"bids": [], "asks": []});
        assert!(parse_snapshot_payload(payload).is_err());
    }

    #[test]
    fn writes_sorted_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot_000001_resync_000001.csv");
        let snapshot = BookSnapshot {
            event_time_ms: 0,
            bids: vec![("99.0".to_string(), "1.0".to_string()), ("100.0".to_string(), "2.0".to_string())],
            asks: vec![("102.0".to_string(), "1.0".to_string()), ("101.0".to_string(), "1.0".to_string())],
            last_update_id: Some(10),
            checksum: None,
            raw: None,
        };
        write_snapshot_csv(&path, 1, 1, &snapshot, 8).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "run_id,event_id,side,price,qty,lastUpdateId");
        assert!(lines.next().unwrap().starts_with("1,1,bid,100.00000000"));
    }
}
