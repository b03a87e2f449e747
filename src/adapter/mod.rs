//! Exchange-specific normalization (spec §4.4): each adapter turns raw wire
//! frames into the normalized `DepthDiff | BookSnapshot | Trade` model and
//! builds the `SyncEngine` its exchange needs. Drivers depend only on this
//! trait, never on a concrete adapter.

pub mod binance;
pub mod bitfinex;
pub mod kraken;

use crate::error::CoreError;
use crate::model::{BookSnapshot, DepthDiff, Trade};
use crate::sync::{SyncEngine, SyncMode};
use serde_json::Value;

/// Everything one inbound WS frame produced, once normalized. Usually exactly
/// one of the three vectors is non-empty.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub snapshots: Vec<BookSnapshot>,
    pub diffs: Vec<DepthDiff>,
    pub trades: Vec<Trade>,
}

pub trait ExchangeAdapter: Send {
    fn name(&self) -> &'static str;
    fn sync_mode(&self) -> SyncMode;

    fn normalize_symbol(&self, symbol: &str) -> String;

    fn symbol_fs(&self, symbol: &str) -> String {
        crate::model::symbols::symbol_fs(&self.normalize_symbol(symbol), true)
    }

    fn ws_url(&self, symbol: &str) -> String;

    /// Subscribe frames to send right after the WS connection opens. Empty
    /// for Binance, whose streams are selected in the URL itself.
    fn subscribe_messages(&self, symbol: &str, depth: usize) -> Vec<Value>;

    fn normalize_depth(&self, depth: usize) -> usize {
        depth
    }

    fn create_sync_engine(&self, depth: usize, max_buffer_size: usize) -> Box<dyn SyncEngine + Send>;

    /// Parse one inbound WS frame. `&mut self` because Bitfinex correlates
    /// channel ids learned from `"subscribed"` events against later array frames.
    fn parse_message(&mut self, data: &Value) -> Result<ParsedBatch, CoreError>;
}

/// Best-effort string form of a JSON scalar, used where an exchange sends a
/// price/qty as a bare JSON number but the checksum/book code wants a string.
pub(crate) fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn by_name(name: &str) -> Result<Box<dyn ExchangeAdapter>, CoreError> {
    match name.trim().to_lowercase().as_str() {
        "binance" => Ok(Box::new(binance::BinanceAdapter)),
        "kraken" => Ok(Box::new(kraken::KrakenAdapter)),
        "bitfinex" => Ok(Box::new(bitfinex::BitfinexAdapter::new())),
        other => Err(CoreError::Fatal(format!("unknown exchange {other:?}"))),
    }
}
