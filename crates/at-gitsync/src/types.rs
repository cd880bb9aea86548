use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::retry::RetryCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Pull,
    Push,
    Fetch,
    Rebase,
    Merge,
}

/// Classification attached to a failed operation (SPEC_FULL.md §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationError {
    pub code: RetryCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }
}

/// A request to enqueue a git operation.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub repository_id: String,
    pub branch: String,
    pub priority: i32,
    pub agent_id: String,
    pub operation: OperationKind,
    pub command: String,
    pub args: Vec<String>,
}

/// A single queued/running/terminal sync operation (SPEC_FULL.md §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub repository_id: String,
    pub branch: String,
    pub priority: i32,
    pub agent_id: String,
    pub operation: OperationKind,
    pub command: String,
    pub args: Vec<String>,
    pub status: OperationStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailOutcome {
    pub will_retry: bool,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub per_repository: std::collections::HashMap<String, QueueStats>,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<OperationStatus>,
    pub limit: Option<usize>,
}
