//! `EventRow`: the authoritative append-only events ledger row (spec §3/§6.2).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event kinds written to `events_*.csv.gz`. Open-ended in the original
/// (`type: str`); modeled as a closed enum here so a typo in a call site is a
/// compile error rather than a silent new event type (spec §9: tagged variants
/// over stringly-typed dicts), with `Other` as the escape hatch for forward
/// compatibility with schema readers that only need the string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    RunStart,
    RunStop,
    StateChange,
    WsConnect,
    WsOpen,
    WsReconnectOpen,
    WsSubscribeAck,
    WsErrorPayload,
    WsInfo,
    WsInfoReconnect,
    WsNoData,
    WsFirstData,
    WsPing,
    WsPong,
    WsPingTimeout,
    WsClose,
    WsSessionExpired,
    WsReconnectWait,
    SnapshotRequest,
    SnapshotLoaded,
    SnapshotRawSaved,
    ChecksumPayloadSaved,
    ResyncStart,
    ResyncDone,
    WindowEnd,
    Fatal,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RunStart => "run_start",
            EventType::RunStop => "run_stop",
            EventType::StateChange => "state_change",
            EventType::WsConnect => "ws_connect",
            EventType::WsOpen => "ws_open",
            EventType::WsReconnectOpen => "ws_reconnect_open",
            EventType::WsSubscribeAck => "ws_subscribe_ack",
            EventType::WsErrorPayload => "ws_error_payload",
            EventType::WsInfo => "ws_info",
            EventType::WsInfoReconnect => "ws_info_reconnect",
            EventType::WsNoData => "ws_no_data",
            EventType::WsFirstData => "ws_first_data",
            EventType::WsPing => "ws_ping",
            EventType::WsPong => "ws_pong",
            EventType::WsPingTimeout => "ws_ping_timeout",
            EventType::WsClose => "ws_close",
            EventType::WsSessionExpired => "ws_session_expired",
            EventType::WsReconnectWait => "ws_reconnect_wait",
            EventType::SnapshotRequest => "snapshot_request",
            EventType::SnapshotLoaded => "snapshot_loaded",
            EventType::SnapshotRawSaved => "snapshot_raw_saved",
            EventType::ChecksumPayloadSaved => "checksum_payload_saved",
            EventType::ResyncStart => "resync_start",
            EventType::ResyncDone => "resync_done",
            EventType::WindowEnd => "window_end",
            EventType::Fatal => "fatal",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the events ledger: `event_id, recv_time_ms, recv_seq, run_id,
/// type, epoch_id, details_json` (spec §6.2).
#[derive(Debug, Clone)]
pub struct EventRow {
    pub event_id: u64,
    pub recv_time_ms: i64,
    pub recv_seq: u64,
    pub run_id: u64,
    pub event_type: EventType,
    pub epoch_id: u64,
    pub details: serde_json::Value,
}
