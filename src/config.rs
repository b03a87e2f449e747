//! Configuration surfaces (spec §6.3): `RecorderConfig` is read once, from
//! the environment, at binary startup — consolidating the scattered
//! `os.getenv(...)` calls in `mm_recorder/recorder.py`. `replay`/`inspect`
//! get ordinary `clap` CLIs since they're one-shot tools, not long-lived
//! daemons; `recorder` layers a thin `clap` override on top of its env vars.

use crate::error::CoreError;
use clap::{Parser, Subcommand};
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "True" | "TRUE"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(v) => v.trim().parse().map_err(|_| CoreError::Fatal(format!("{key} is not a valid value: {v:?}"))),
        Err(_) => Ok(default),
    }
}

/// Everything the recorder driver needs, consolidated at startup so a bad
/// value fails fast instead of mid-run.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub exchange: String,
    pub symbol: String,
    pub data_dir: std::path::PathBuf,
    pub log_dir: std::path::PathBuf,

    pub depth_levels: usize,
    pub max_buffer_warn: usize,
    pub snapshot_limit: usize,
    pub store_depth_diffs: bool,

    pub window_tz: String,
    pub window_start_hhmm: String,
    pub window_end_hhmm: String,
    pub window_end_day_offset: i64,

    pub ws_ping_interval: Duration,
    pub ws_ping_timeout: Duration,
    pub ws_reconnect_backoff: Duration,
    pub ws_reconnect_backoff_max: Duration,
    pub ws_max_session: Duration,
    pub ws_open_timeout: Duration,
    pub ws_no_data_warn: Duration,
    pub insecure_tls: bool,

    pub live_stream_enabled: bool,
    pub live_stream_rotate: Duration,
    pub live_stream_retention: Duration,

    pub price_tick_size: Option<f64>,
    pub metadata_strict: bool,
}

impl RecorderConfig {
    /// Reads the whole environment surface once; `SYMBOL` is the one
    /// required variable (mirrors `recorder.py`'s explicit check).
    pub fn from_env() -> Result<Self, CoreError> {
        let symbol = std::env::var("SYMBOL").unwrap_or_default().trim().to_string();
        if symbol.is_empty() {
            return Err(CoreError::Fatal("SYMBOL environment variable is required (e.g. SYMBOL=BTCUSDT)".into()));
        }

        Ok(Self {
            exchange: env_or("EXCHANGE", "binance").to_lowercase(),
            symbol,
            data_dir: env_or("DATA_DIR", "data").into(),
            log_dir: env_or("LOG_DIR", "logs").into(),

            depth_levels: env_parse("DEPTH_LEVELS", 20usize)?,
            max_buffer_warn: env_parse("MAX_BUFFER_WARN", 5000usize)?,
            snapshot_limit: env_parse("SNAPSHOT_LIMIT", 1000usize)?,
            store_depth_diffs: env_flag("STORE_DEPTH_DIFFS", true),

            window_tz: env_or("WINDOW_TZ", "Europe/Berlin"),
            window_start_hhmm: env_or("WINDOW_START_HHMM", "00:00"),
            window_end_hhmm: env_or("WINDOW_END_HHMM", "00:15"),
            window_end_day_offset: env_parse("WINDOW_END_DAY_OFFSET", 1i64)?,

            ws_ping_interval: Duration::from_secs_f64(env_parse("WS_PING_INTERVAL_S", 20.0)?),
            ws_ping_timeout: Duration::from_secs_f64(env_parse("WS_PING_TIMEOUT_S", 60.0)?),
            ws_reconnect_backoff: Duration::from_secs_f64(env_parse("WS_RECONNECT_BACKOFF_S", 1.0)?),
            ws_reconnect_backoff_max: Duration::from_secs_f64(env_parse("WS_RECONNECT_BACKOFF_MAX_S", 30.0)?),
            ws_max_session: Duration::from_secs_f64(env_parse("WS_MAX_SESSION_S", (23 * 3600 + 50 * 60) as f64)?),
            ws_open_timeout: Duration::from_secs_f64(env_parse("WS_OPEN_TIMEOUT_S", 10.0)?),
            ws_no_data_warn: Duration::from_secs_f64(env_parse("WS_NO_DATA_WARN_S", 10.0)?),
            insecure_tls: env_flag("INSECURE_TLS", false),

            live_stream_enabled: env_flag("LIVE_STREAM", true),
            live_stream_rotate: Duration::from_secs_f64(env_parse("LIVE_STREAM_ROTATE_S", 60.0)?),
            live_stream_retention: Duration::from_secs_f64(env_parse("LIVE_STREAM_RETENTION_S", 3600.0)?),

            price_tick_size: match std::env::var("MM_PRICE_TICK_SIZE") {
                Ok(v) if !v.trim().is_empty() => {
                    Some(v.trim().parse().map_err(|_| CoreError::Fatal(format!("bad MM_PRICE_TICK_SIZE {v:?}")))?)
                }
                _ => None,
            },
            // Reinterpreted from the original `MM_METADATA_STRICT` (fail if a REST
            // metadata fetch fails) into a cross-run consistency guard — see
            // `recorder::metadata::MetadataGuard` and DESIGN.md.
            metadata_strict: env_flag("MM_METADATA_STRICT", true),
        })
    }
}

/// `replay` — deterministically re-feed a recorded day through the same sync
/// engines used live (spec §4.6).
#[derive(Debug, Parser)]
#[command(name = "replay", about = "Replay a recorded day through the sync engine")]
pub struct ReplayArgs {
    #[arg(long, env = "EXCHANGE")]
    pub exchange: String,
    #[arg(long, env = "SYMBOL")]
    pub symbol: String,
    /// Day directory, e.g. `data/binance/BTCUSDT/20260115`.
    #[arg(long)]
    pub day_dir: std::path::PathBuf,
    /// Only replay diffs/trades with `recv_ms` in `[from_ms, to_ms)`.
    #[arg(long)]
    pub from_ms: Option<i64>,
    #[arg(long)]
    pub to_ms: Option<i64>,
}

#[derive(Debug, Parser)]
#[command(name = "inspect", about = "Offline maintenance and validation tools for recorded days")]
pub struct InspectArgs {
    #[command(subcommand)]
    pub command: InspectCommand,
}

#[derive(Debug, Subcommand)]
pub enum InspectCommand {
    /// Replay every segment in a day directory and report applied/gap counts.
    Validate {
        #[arg(long)]
        day_dir: std::path::PathBuf,
    },
    /// Merge recorded trades into OHLCV candles, local data taking precedence
    /// over any pre-existing `history/candles_*` files for the same bucket.
    Combine {
        #[arg(long)]
        day_dir: std::path::PathBuf,
        #[arg(long, default_value = "1m")]
        interval: String,
    },
    /// Scan the gap/event ledgers and report total gap time, longest gap, and epoch count.
    Coverage {
        #[arg(long)]
        day_dir: std::path::PathBuf,
    },
    /// Drop rows outside a day's own time window from its CSV/NDJSON files.
    Gc {
        #[arg(long)]
        day_dir: std::path::PathBuf,
        #[arg(long, default_value = "Europe/Berlin")]
        tz: String,
        /// Report only; don't rewrite files.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_to_default_when_unset() {
        std::env::remove_var("LOB_SYNC_TEST_UNSET_KEY");
        let v: usize = env_parse("LOB_SYNC_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn env_flag_recognizes_truthy_values() {
        std::env::set_var("LOB_SYNC_TEST_FLAG", "true");
        assert!(env_flag("LOB_SYNC_TEST_FLAG", false));
        std::env::set_var("LOB_SYNC_TEST_FLAG", "0");
        assert!(!env_flag("LOB_SYNC_TEST_FLAG", true));
        std::env::remove_var("LOB_SYNC_TEST_FLAG");
    }
}
