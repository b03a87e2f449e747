//! `DepthDiff`: a normalized incremental book update (spec §3), grounded on
//! `mm_recorder/exchanges/types.py::DepthDiff`.

use serde::{Deserialize, Serialize};

/// One `[price_str, qty_str]` level update, kept as strings to preserve
/// exactness until parsed by `LocalOrderBook` (spec §6.2).
pub type LevelUpdate = (String, String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthDiff {
    pub event_time_ms: i64,
    /// Sequence range `[U, u]`. Zero for checksum exchanges that don't number updates.
    pub u_start: u64,
    pub u_end: u64,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
    pub checksum: Option<u32>,
    /// Preserved raw exchange envelope, for audit and for checksum engines that
    /// need exchange-specific fields (`count`, `side`) not in the normalized shape.
    pub raw: Option<serde_json::Value>,
}

impl DepthDiff {
    pub fn new(event_time_ms: i64, u_start: u64, u_end: u64, bids: Vec<LevelUpdate>, asks: Vec<LevelUpdate>) -> Self {
        Self { event_time_ms, u_start, u_end, bids, asks, checksum: None, raw: None }
    }
}
