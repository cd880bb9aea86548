use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whoever performed the audited action. `System` covers background
/// sweeps and other operations with no inbound caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
    User(String),
    ApiKey(String),
    System,
}

impl Actor {
    pub fn from_caller(caller: Option<&at_core::correlation::Caller>) -> Self {
        match caller {
            None => Actor::System,
            Some(c) => match (&c.user_id, &c.api_key_id) {
                (Some(user_id), _) => Actor::User(user_id.clone()),
                (None, Some(api_key_id)) => Actor::ApiKey(api_key_id.clone()),
                (None, None) => Actor::System,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Denied,
    Error,
}

/// An immutable audit record (SPEC_FULL.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub correlation_id: String,
    pub actor: Actor,
    pub action: String,
    pub target: String,
    pub outcome: Outcome,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
