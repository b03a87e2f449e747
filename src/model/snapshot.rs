//! `BookSnapshot`: a full-book snapshot, sourced from REST (sequence
//! exchanges) or a WS snapshot frame (checksum exchanges). Spec §3/§4.4.

use crate::model::diff::LevelUpdate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub event_time_ms: i64,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
    /// Binance-style horizon; `None` for checksum exchanges.
    pub last_update_id: Option<u64>,
    pub checksum: Option<u32>,
    pub raw: Option<serde_json::Value>,
}

impl BookSnapshot {
    pub fn new(bids: Vec<LevelUpdate>, asks: Vec<LevelUpdate>) -> Self {
        Self { event_time_ms: 0, bids, asks, last_update_id: None, checksum: None, raw: None }
    }
}
