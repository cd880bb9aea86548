use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single delivered event, shaped per SPEC_FULL.md §4.C's delivery
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubMessage {
    pub channel: String,
    pub message_type: String,
    pub data: Value,
    pub cursor: String,
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

/// A frame placed on a subscriber's outbound queue: either a live event,
/// a one-shot snapshot marker for channels that support it, or a signal
/// that the subscriber's cursor could not be honoured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Event(HubMessage),
    Snapshot { channel: String, at_cursor: Option<String> },
    ResyncRequired { channel: String },
}

/// Statistics recorded for every replay, per SPEC_FULL.md §4.C's "replay
/// safeguards" — the caller persists this via the audit sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayAudit {
    pub connection_id: String,
    pub user_id: Option<String>,
    pub channel: String,
    pub from_cursor: Option<String>,
    pub to_cursor: Option<String>,
    pub messages_replayed: usize,
    pub cursor_expired: bool,
    pub used_snapshot: bool,
    pub duration_ms: u64,
}
