//! The live recording loop (spec §4.5), grounded on `mm_recorder/recorder.py`'s
//! `run_recorder`: sleep until the configured window opens, snapshot, stream
//! depth/trade frames into the sync engine, durably ledger every transition,
//! and stop cleanly at the window's end.
//!
//! The reconnect-with-backoff shape (`connect_async`, split sink/stream,
//! respond to `Ping` with `Pong`, double the backoff on error) follows
//! `scrapers/binance_book_ticker.rs`'s `connect_and_stream`/`run_loop`;
//! everything exchange-specific (parsing, sync bridging, gap handling) is
//! delegated to the `ExchangeAdapter`/`SyncEngine` traits instead of being
//! hardcoded to one exchange.

use crate::adapter::{self, ExchangeAdapter};
use crate::clock::{self, WindowConfig};
use crate::config::RecorderConfig;
use crate::error::{GapReason, SyncAction};
use crate::model::{BookSnapshot, DepthDiff, EventType, Trade};
use crate::recorder::metadata::MetadataGuard;
use crate::recorder::persistence::{DayLayout, GzCsvWriter, GzLineWriter, LedgerPaths, LiveNdjsonWriter, Schema};
use crate::recorder::snapshot;
use crate::recorder::state::{RecorderPhase, RecorderState};
use crate::sync::{SyncEngine, SyncMode};
use chrono::Utc;
use chrono_tz::Tz;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const BINANCE_REST_BASE: &str = "https://api.binance.com";

const TRADES_HEADER: [&str; 13] = [
    "event_time_ms",
    "recv_time_ms",
    "recv_seq",
    "run_id",
    "trade_id",
    "trade_time_ms",
    "price",
    "qty",
    "is_buyer_maker",
    "side",
    "ord_type",
    "exchange",
    "symbol",
];
const GAPS_HEADER: [&str; 6] = ["recv_time_ms", "recv_seq", "run_id", "epoch_id", "event", "details"];
const EVENTS_HEADER: [&str; 7] = ["event_id", "recv_time_ms", "recv_seq", "run_id", "type", "epoch_id", "details_json"];

/// Spec §6.2: leading tuple `event_time_ms, recv_time_ms, recv_seq, run_id,
/// epoch_id`, then per-level interleaved `bid{i}_price, bid{i}_qty,
/// ask{i}_price, ask{i}_qty`.
fn ob_header(depth_levels: usize) -> Vec<String> {
    let mut header = vec![
        "event_time_ms".to_string(),
        "recv_time_ms".to_string(),
        "recv_seq".to_string(),
        "run_id".to_string(),
        "epoch_id".to_string(),
    ];
    for i in 1..=depth_levels {
        header.push(format!("bid{i}_price"));
        header.push(format!("bid{i}_qty"));
        header.push(format!("ask{i}_price"));
        header.push(format!("ask{i}_qty"));
    }
    header
}

fn depth_diff_line(recv_time_ms: i64, recv_seq: u64, diff: &DepthDiff) -> String {
    serde_json::json!({
        "recv_ms": recv_time_ms,
        "recv_seq": recv_seq,
        "E": diff.event_time_ms,
        "U": diff.u_start,
        "u": diff.u_end,
        "b": diff.bids,
        "a": diff.asks,
        "checksum": diff.checksum,
    })
    .to_string()
}

/// The fixed set of per-day writers a run owns (spec §6.2). `diffs`/`trades_raw`
/// and the `live_*` pair are optional per `RecorderConfig`.
struct RecorderWriters {
    orderbook: GzCsvWriter,
    trades: GzCsvWriter,
    gaps: GzCsvWriter,
    events: GzCsvWriter,
    diffs: Option<GzLineWriter>,
    trades_raw: Option<GzLineWriter>,
    live_depth: Option<LiveNdjsonWriter>,
    live_trades: Option<LiveNdjsonWriter>,
}

/// Entry point: record one day's worth of market data for `cfg.exchange` /
/// `cfg.symbol`, starting at (or immediately inside) the configured window
/// and stopping cleanly at its end.
pub async fn run(cfg: RecorderConfig) -> anyhow::Result<()> {
    let tz: Tz = cfg.window_tz.parse().map_err(|_| anyhow::anyhow!("invalid WINDOW_TZ {:?}", cfg.window_tz))?;
    let start_hhmm = clock::parse_hhmm(&cfg.window_start_hhmm, "WINDOW_START_HHMM")?;
    let end_hhmm = clock::parse_hhmm(&cfg.window_end_hhmm, "WINDOW_END_HHMM")?;
    let window_cfg = WindowConfig { tz, start_hhmm, end_hhmm, end_day_offset: cfg.window_end_day_offset };

    let now = Utc::now().with_timezone(&tz);
    let (window_start, window_end) = clock::compute_window(now, &window_cfg);
    if now < window_start {
        let wait = (window_start - now).to_std().unwrap_or_default();
        tracing::info!(wait_s = wait.as_secs(), "sleeping until recording window start");
        tokio::time::sleep(wait).await;
    }

    let mut adapter = adapter::by_name(&cfg.exchange)?;
    let symbol = adapter.normalize_symbol(&cfg.symbol);
    let symbol_fs = adapter.symbol_fs(&cfg.symbol);
    let depth_levels = adapter.normalize_depth(cfg.depth_levels);
    let day = window_start.format("%Y%m%d").to_string();

    let layout = DayLayout::build(&cfg.data_dir, &cfg.exchange, &symbol_fs, &day)?;
    MetadataGuard::new(cfg.metadata_strict)
        .check(&layout.day_dir, depth_levels, cfg.price_tick_size)
        .map_err(|e| anyhow::anyhow!(e))?;

    let run_id = clock::now_ms().max(1) as u64;
    let schema = Schema {
        exchange: cfg.exchange.clone(),
        symbol: symbol.clone(),
        symbol_fs: symbol_fs.clone(),
        depth_levels,
        decimals: 8,
        tick_size: cfg.price_tick_size,
        checksum_depth: None,
        run_id,
    };
    schema.write(&layout.day_dir)?;

    let paths = LedgerPaths::new(&layout, &symbol_fs, &day);
    let ob_header = ob_header(depth_levels);
    let ob_header_refs: Vec<&str> = ob_header.iter().map(String::as_str).collect();

    let writers = RecorderWriters {
        orderbook: GzCsvWriter::create(&paths.orderbook_csv, &ob_header_refs, 200, Duration::from_secs(5))?,
        trades: GzCsvWriter::create(&paths.trades_csv, &TRADES_HEADER, 200, Duration::from_secs(5))?,
        gaps: GzCsvWriter::create(&paths.gaps_csv, &GAPS_HEADER, 10, Duration::from_secs(5))?,
        events: GzCsvWriter::create(&paths.events_csv, &EVENTS_HEADER, 10, Duration::from_secs(5))?,
        diffs: if cfg.store_depth_diffs {
            Some(GzLineWriter::create(&paths.depth_diffs_ndjson, 200, Duration::from_secs(5))?)
        } else {
            None
        },
        trades_raw: Some(GzLineWriter::create(&paths.trades_raw_ndjson, 200, Duration::from_secs(5))?),
        live_depth: if cfg.live_stream_enabled {
            Some(LiveNdjsonWriter::create(&paths.live_depth_diffs, cfg.live_stream_rotate, cfg.live_stream_retention)?)
        } else {
            None
        },
        live_trades: if cfg.live_stream_enabled {
            Some(LiveNdjsonWriter::create(&paths.live_trades, cfg.live_stream_rotate, cfg.live_stream_retention)?)
        } else {
            None
        },
    };

    let engine = adapter.create_sync_engine(depth_levels, cfg.max_buffer_warn);
    let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    let window_end_ms = window_end.timestamp_millis();

    let mut recorder = Recorder {
        cfg: cfg.clone(),
        adapter,
        engine,
        state: RecorderState::default(),
        writers,
        layout,
        run_id,
        symbol,
        depth_levels,
        window_end_ms,
        http,
        force_reconnect: false,
    };

    recorder.emit_event(
        EventType::RunStart,
        serde_json::json!({"exchange": recorder.cfg.exchange, "symbol": recorder.symbol, "run_id": run_id, "window_end_ms": window_end_ms}),
    )?;

    recorder.state.phase = RecorderPhase::Snapshot;
    recorder.state.needs_snapshot = true;
    recorder.state.pending_snapshot_tag = Some("initial".to_string());

    if recorder.adapter.sync_mode() == SyncMode::Sequence {
        let snapshot = snapshot::fetch_binance_snapshot(&recorder.http, BINANCE_REST_BASE, &recorder.symbol, recorder.cfg.snapshot_limit).await?;
        let recv_time_ms = clock::now_ms();
        recorder.record_snapshot(snapshot, recv_time_ms)?;
    }
    // Checksum exchanges (Kraken/Bitfinex) deliver their snapshot over the WS
    // stream itself; `record_snapshot` is reached the first time
    // `connect_and_stream` sees a snapshot frame.

    let mut backoff = recorder.cfg.ws_reconnect_backoff;
    while clock::now_ms() < recorder.window_end_ms {
        match recorder.connect_and_stream().await {
            Ok(()) => backoff = recorder.cfg.ws_reconnect_backoff,
            Err(e) => {
                tracing::warn!("recorder connection error: {e}");
                backoff = (backoff * 2).min(recorder.cfg.ws_reconnect_backoff_max);
            }
        }
        if clock::now_ms() >= recorder.window_end_ms {
            break;
        }
        recorder.emit_event(EventType::WsReconnectWait, serde_json::json!({"backoff_ms": backoff.as_millis() as u64}))?;
        tokio::time::sleep(backoff).await;
    }

    if !recorder.state.window_end_emitted {
        recorder.state.window_end_emitted = true;
        recorder.emit_event(EventType::WindowEnd, serde_json::json!({}))?;
    }
    recorder.state.phase = RecorderPhase::Stopped;
    recorder.emit_event(
        EventType::RunStop,
        serde_json::json!({
            "depth_msgs": recorder.state.depth_msg_count,
            "trade_msgs": recorder.state.trade_msg_count,
            "resync_count": recorder.state.resync_count,
            "ob_rows": recorder.state.ob_rows_written,
            "tr_rows": recorder.state.tr_rows_written,
        }),
    )?;

    recorder.finalize()
}

/// Owns the run's mutable state, engine, and writers across WS reconnects.
struct Recorder {
    cfg: RecorderConfig,
    adapter: Box<dyn ExchangeAdapter>,
    engine: Box<dyn SyncEngine + Send>,
    state: RecorderState,
    writers: RecorderWriters,
    layout: DayLayout,
    run_id: u64,
    symbol: String,
    depth_levels: usize,
    window_end_ms: i64,
    http: reqwest::Client,
    /// Set on a gap for checksum exchanges, which have no REST resync path:
    /// the only way to provoke a fresh snapshot frame is to reconnect and
    /// re-subscribe (spec §4.3 "resync by reconnect").
    force_reconnect: bool,
}

impl Recorder {
    fn write_event_row(&mut self, event_id: u64, event_type: EventType, details: Value, recv_time_ms: i64, recv_seq: u64) -> anyhow::Result<()> {
        self.writers.events.write_row([
            event_id.to_string(),
            recv_time_ms.to_string(),
            recv_seq.to_string(),
            self.run_id.to_string(),
            event_type.as_str().to_string(),
            self.state.epoch_id.to_string(),
            details.to_string(),
        ])?;
        Ok(())
    }

    fn emit_event(&mut self, event_type: EventType, details: Value) -> anyhow::Result<()> {
        let recv_time_ms = clock::now_ms();
        let recv_seq = self.state.next_recv_seq();
        let event_id = self.state.next_event_id();
        self.write_event_row(event_id, event_type, details, recv_time_ms, recv_seq)
    }

    fn write_gap(&mut self, reason: &GapReason, recv_time_ms: i64, recv_seq: u64) -> anyhow::Result<()> {
        self.writers.gaps.write_row([
            recv_time_ms.to_string(),
            recv_seq.to_string(),
            self.run_id.to_string(),
            self.state.epoch_id.to_string(),
            format!("{reason:?}"),
            reason.to_string(),
        ])?;
        Ok(())
    }

    /// Persist a freshly-adopted snapshot (REST, Binance, or WS-delivered,
    /// Kraken/Bitfinex) and complete the sync transition if the engine is
    /// already `depth_synced` immediately after adoption. The sequence engine
    /// isn't: it needs a subsequent bridging diff, handled in `handle_depth`'s
    /// `SyncAction::Synced` arm instead.
    fn record_snapshot(&mut self, snapshot: BookSnapshot, recv_time_ms: i64) -> anyhow::Result<()> {
        let recv_seq = self.state.next_recv_seq();
        let tag = self.state.pending_snapshot_tag.clone().unwrap_or_else(|| "initial".to_string());
        let event_id = self.state.next_event_id();

        let csv_path = LedgerPaths::snapshot_path(&self.layout, event_id, &tag);
        snapshot::write_snapshot_csv(&csv_path, self.run_id, event_id, &snapshot, 8)?;
        if let Some(raw) = snapshot.raw.clone() {
            let json_path = LedgerPaths::snapshot_json_path(&self.layout, event_id, &tag);
            snapshot::write_snapshot_json(&json_path, &raw)?;
        }

        let last_update_id = snapshot.last_update_id;
        self.engine.adopt_snapshot(snapshot)?;

        let rel_path = format!("snapshots/snapshot_{event_id:06}_{tag}.csv");
        self.write_event_row(
            event_id,
            EventType::SnapshotLoaded,
            serde_json::json!({"tag": tag, "path": rel_path, "lastUpdateId": last_update_id}),
            recv_time_ms,
            recv_seq,
        )?;

        if self.engine.depth_synced() {
            self.complete_sync(&tag)?;
        } else {
            self.state.phase = RecorderPhase::Syncing;
        }
        Ok(())
    }

    fn complete_sync(&mut self, tag: &str) -> anyhow::Result<()> {
        self.state.mark_synced();
        if tag != "initial" {
            self.emit_event(EventType::ResyncDone, serde_json::json!({"tag": tag}))?;
        }
        Ok(())
    }

    /// Enter `Resyncing` and, for sequence exchanges, re-fetch a REST snapshot
    /// immediately; for checksum exchanges, flag the current WS session for a
    /// forced reconnect so a fresh snapshot frame arrives on re-subscribe.
    async fn begin_resync(&mut self) -> anyhow::Result<()> {
        self.engine.reset_for_resync();
        let tag = self.state.begin_resync();
        self.emit_event(EventType::ResyncStart, serde_json::json!({"tag": tag}))?;

        match self.adapter.sync_mode() {
            SyncMode::Sequence => {
                let snapshot = snapshot::fetch_binance_snapshot(&self.http, BINANCE_REST_BASE, &self.symbol, self.cfg.snapshot_limit).await?;
                let recv_time_ms = clock::now_ms();
                self.record_snapshot(snapshot, recv_time_ms)?;
            }
            SyncMode::Checksum => {
                self.force_reconnect = true;
            }
        }
        Ok(())
    }

    fn write_topn(&mut self, recv_time_ms: i64, recv_seq: u64) -> anyhow::Result<()> {
        let (bids, asks) = self.engine.lob().top_n(self.depth_levels);
        let mut row = vec![
            self.state.last_depth_event_ms.unwrap_or(0).to_string(),
            recv_time_ms.to_string(),
            recv_seq.to_string(),
            self.run_id.to_string(),
            self.state.epoch_id.to_string(),
        ];
        for i in 0..self.depth_levels {
            let (bp, bq) = bids.get(i).copied().unwrap_or((0.0, 0.0));
            let (ap, aq) = asks.get(i).copied().unwrap_or((0.0, 0.0));
            row.push(format!("{bp:.8}"));
            row.push(format!("{bq:.8}"));
            row.push(format!("{ap:.8}"));
            row.push(format!("{aq:.8}"));
        }
        self.writers.orderbook.write_row(row)?;
        self.state.ob_rows_written += 1;

        if let Some(w) = self.writers.live_depth.as_mut() {
            let line = serde_json::json!({"recv_time_ms": recv_time_ms, "recv_seq": recv_seq, "bids": bids, "asks": asks}).to_string();
            w.write_line(&line)?;
        }
        Ok(())
    }

    async fn handle_depth(&mut self, diff: DepthDiff, recv_time_ms: i64) -> anyhow::Result<()> {
        let recv_seq = self.state.next_recv_seq();
        self.engine.set_last_recv_seq(recv_seq);
        self.state.depth_msg_count += 1;
        self.state.last_depth_event_ms = Some(diff.event_time_ms);

        if self.cfg.store_depth_diffs {
            let line = depth_diff_line(recv_time_ms, recv_seq, &diff);
            if let Some(w) = self.writers.diffs.as_mut() {
                w.write_line(&line)?;
            }
            if let Some(w) = self.writers.live_depth.as_mut() {
                w.write_line(&line)?;
            }
        }

        match self.engine.feed(diff)? {
            SyncAction::Gap(reason) => {
                self.write_gap(&reason, recv_time_ms, recv_seq)?;
                self.begin_resync().await?;
            }
            SyncAction::Synced => {
                let tag = self.state.pending_snapshot_tag.clone().unwrap_or_else(|| "initial".to_string());
                self.complete_sync(&tag)?;
                self.write_topn(recv_time_ms, recv_seq)?;
            }
            SyncAction::Applied => {
                if self.engine.depth_synced() {
                    self.write_topn(recv_time_ms, recv_seq)?;
                }
            }
            SyncAction::Buffered | SyncAction::Stale => {}
        }
        Ok(())
    }

    fn handle_trade(&mut self, trade: Trade, recv_time_ms: i64) -> anyhow::Result<()> {
        let recv_seq = self.state.next_recv_seq();
        self.state.trade_msg_count += 1;
        self.state.last_trade_event_ms = Some(trade.event_time_ms);

        self.writers.trades.write_row([
            trade.event_time_ms.to_string(),
            recv_time_ms.to_string(),
            recv_seq.to_string(),
            self.run_id.to_string(),
            trade.trade_id.to_string(),
            trade.trade_time_ms.to_string(),
            trade.price.to_string(),
            trade.qty.to_string(),
            trade.is_buyer_maker.to_string(),
            trade.resolved_side().to_string(),
            trade.ord_type.clone().unwrap_or_default(),
            self.adapter.name().to_string(),
            self.symbol.clone(),
        ])?;
        self.state.tr_rows_written += 1;

        if let Some(w) = self.writers.trades_raw.as_mut() {
            let mut raw = trade.raw.clone().unwrap_or(Value::Null);
            if let Value::Object(ref mut map) = raw {
                map.insert("recv_time_ms".into(), recv_time_ms.into());
                map.insert("recv_seq".into(), recv_seq.into());
            }
            w.write_line(&raw.to_string())?;
        }
        if let Some(w) = self.writers.live_trades.as_mut() {
            let line = serde_json::json!({
                "recv_time_ms": recv_time_ms,
                "recv_seq": recv_seq,
                "trade_id": trade.trade_id,
                "price": trade.price,
                "qty": trade.qty,
                "side": trade.resolved_side(),
            })
            .to_string();
            w.write_line(&line)?;
        }
        Ok(())
    }

    fn is_control_frame(value: &Value) -> bool {
        value.get("method").is_some() || matches!(value.get("channel").and_then(|v| v.as_str()), Some("heartbeat") | Some("status"))
    }

    fn handle_control_frame(&mut self, value: Value) -> anyhow::Result<()> {
        if matches!(value.get("channel").and_then(|v| v.as_str()), Some("heartbeat")) {
            return Ok(());
        }
        match value.get("success").and_then(|v| v.as_bool()) {
            Some(true) => self.emit_event(EventType::WsSubscribeAck, value),
            Some(false) => self.emit_event(EventType::WsErrorPayload, value),
            None => self.emit_event(EventType::WsInfo, value),
        }
    }

    async fn handle_text_frame(&mut self, text: &str) -> anyhow::Result<()> {
        let recv_time_ms = clock::now_ms();
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("non-json ws frame ignored: {e}");
                return Ok(());
            }
        };

        if Self::is_control_frame(&value) {
            return self.handle_control_frame(value);
        }

        if !self.state.first_data_emitted {
            self.state.first_data_emitted = true;
            self.emit_event(EventType::WsFirstData, serde_json::json!({}))?;
        }

        let batch = match self.adapter.parse_message(&value) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("failed to parse ws frame: {e}");
                return Ok(());
            }
        };

        for snapshot in batch.snapshots {
            self.record_snapshot(snapshot, recv_time_ms)?;
        }
        for diff in batch.diffs {
            self.handle_depth(diff, recv_time_ms).await?;
        }
        for trade in batch.trades {
            self.handle_trade(trade, recv_time_ms)?;
        }
        Ok(())
    }

    /// One WS connection's worth of life: connect, subscribe, stream until
    /// the window ends, a forced resync reconnect is requested, the session
    /// grows stale, or the connection drops. Mirrors
    /// `binance_book_ticker.rs::connect_and_stream`, generalized over
    /// `ExchangeAdapter`.
    async fn connect_and_stream(&mut self) -> anyhow::Result<()> {
        let url = self.adapter.ws_url(&self.symbol);
        let (ws_stream, _) = tokio::time::timeout(self.cfg.ws_open_timeout, connect_async(&url))
            .await
            .map_err(|_| anyhow::anyhow!("websocket connect to {url} timed out"))??;

        self.state.ws_open_count += 1;
        let open_event = if self.state.ws_open_count == 1 { EventType::WsOpen } else { EventType::WsReconnectOpen };
        self.emit_event(open_event, serde_json::json!({"url": url}))?;

        let (mut write, mut read) = ws_stream.split();
        for frame in self.adapter.subscribe_messages(&self.symbol, self.depth_levels) {
            write.send(Message::Text(frame.to_string())).await?;
        }

        self.force_reconnect = false;
        self.state.last_ws_msg_time_ms = Some(clock::now_ms());
        let session_start = Instant::now();

        loop {
            if clock::now_ms() >= self.window_end_ms || self.force_reconnect {
                return Ok(());
            }
            if session_start.elapsed() >= self.cfg.ws_max_session {
                self.emit_event(EventType::WsSessionExpired, serde_json::json!({}))?;
                return Ok(());
            }

            match tokio::time::timeout(self.cfg.ws_no_data_warn, read.next()).await {
                Ok(Some(Ok(message))) => {
                    self.state.last_ws_msg_time_ms = Some(clock::now_ms());
                    match message {
                        Message::Text(text) => self.handle_text_frame(&text).await?,
                        Message::Binary(bytes) => self.handle_text_frame(&String::from_utf8_lossy(&bytes)).await?,
                        Message::Ping(payload) => write.send(Message::Pong(payload)).await?,
                        Message::Pong(_) => {}
                        Message::Close(frame) => {
                            self.emit_event(EventType::WsClose, serde_json::json!({"frame": frame.map(|f| f.reason.to_string())}))?;
                            return Ok(());
                        }
                        Message::Frame(_) => {}
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::warn!("websocket error: {e}");
                    return Ok(());
                }
                Ok(None) => {
                    tracing::warn!("websocket stream ended");
                    return Ok(());
                }
                Err(_) => {
                    let idle_for = self.state.last_ws_msg_time_ms.map(|t| clock::now_ms() - t).unwrap_or(0);
                    if idle_for >= self.cfg.ws_ping_timeout.as_millis() as i64 {
                        self.emit_event(EventType::WsPingTimeout, serde_json::json!({"idle_ms": idle_for}))?;
                        return Ok(());
                    }
                    if clock::now_ms() - self.state.last_no_data_warn_ms >= self.cfg.ws_no_data_warn.as_millis() as i64 {
                        self.state.last_no_data_warn_ms = clock::now_ms();
                        self.emit_event(EventType::WsNoData, serde_json::json!({"idle_ms": idle_for}))?;
                    }
                }
            }
        }
    }

    fn finalize(self) -> anyhow::Result<()> {
        self.writers.orderbook.close()?;
        self.writers.trades.close()?;
        self.writers.gaps.close()?;
        self.writers.events.close()?;
        if let Some(w) = self.writers.diffs {
            w.close()?;
        }
        if let Some(w) = self.writers.trades_raw {
            w.close()?;
        }
        if let Some(w) = self.writers.live_depth {
            w.close();
        }
        if let Some(w) = self.writers.live_trades {
            w.close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spec §6.2: leading tuple + interleaved per-level names, no grouping
    /// of all bids before all asks.
    #[test]
    fn ob_header_interleaves_levels_and_carries_epoch_id() {
        let header = ob_header(2);
        assert_eq!(
            header,
            vec![
                "event_time_ms",
                "recv_time_ms",
                "recv_seq",
                "run_id",
                "epoch_id",
                "bid1_price",
                "bid1_qty",
                "ask1_price",
                "ask1_qty",
                "bid2_price",
                "bid2_qty",
                "ask2_price",
                "ask2_qty",
            ]
        );
    }
}
