//! Types shared across every subsystem: the pub/sub channel taxonomy and
//! the authorisation context used to mediate subscribe/publish (§4.C).

use serde::{Deserialize, Serialize};

/// A channel is a tagged value, never a free-form string, so authorisation
/// and routing stay exhaustive (SPEC_FULL.md §4.C, §9 "Polymorphism").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Channel {
    AgentOutput { agent_id: String },
    AgentState { agent_id: String },
    AgentTools { agent_id: String },
    WorkspaceAgents { workspace_id: String },
    WorkspaceReservations { workspace_id: String },
    WorkspaceConflicts { workspace_id: String },
    UserMail { user_id: String },
    UserNotifications { user_id: String },
    SystemHealth,
    SystemMetrics,
    SystemDcg,
}

impl Channel {
    /// The stable wire name used in WebSocket frames and the event log's
    /// `channel` column, e.g. `agent:output:<id>` or `system:dcg`.
    pub fn wire_name(&self) -> String {
        match self {
            Channel::AgentOutput { agent_id } => format!("agent:output:{agent_id}"),
            Channel::AgentState { agent_id } => format!("agent:state:{agent_id}"),
            Channel::AgentTools { agent_id } => format!("agent:tools:{agent_id}"),
            Channel::WorkspaceAgents { workspace_id } => format!("workspace:agents:{workspace_id}"),
            Channel::WorkspaceReservations { workspace_id } => {
                format!("workspace:reservations:{workspace_id}")
            }
            Channel::WorkspaceConflicts { workspace_id } => {
                format!("workspace:conflicts:{workspace_id}")
            }
            Channel::UserMail { user_id } => format!("user:mail:{user_id}"),
            Channel::UserNotifications { user_id } => format!("user:notifications:{user_id}"),
            Channel::SystemHealth => "system:health".to_string(),
            Channel::SystemMetrics => "system:metrics".to_string(),
            Channel::SystemDcg => "system:dcg".to_string(),
        }
    }

    /// Parse a wire name back into a [`Channel`]. Inverse of
    /// [`Channel::wire_name`]; used when a client's `subscribe` frame names
    /// a channel by its wire string.
    pub fn parse(wire: &str) -> Option<Channel> {
        let mut parts = wire.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("agent"), Some("output"), Some(id)) => Some(Channel::AgentOutput { agent_id: id.to_string() }),
            (Some("agent"), Some("state"), Some(id)) => Some(Channel::AgentState { agent_id: id.to_string() }),
            (Some("agent"), Some("tools"), Some(id)) => Some(Channel::AgentTools { agent_id: id.to_string() }),
            (Some("workspace"), Some("agents"), Some(id)) => {
                Some(Channel::WorkspaceAgents { workspace_id: id.to_string() })
            }
            (Some("workspace"), Some("reservations"), Some(id)) => {
                Some(Channel::WorkspaceReservations { workspace_id: id.to_string() })
            }
            (Some("workspace"), Some("conflicts"), Some(id)) => {
                Some(Channel::WorkspaceConflicts { workspace_id: id.to_string() })
            }
            (Some("user"), Some("mail"), Some(id)) => Some(Channel::UserMail { user_id: id.to_string() }),
            (Some("user"), Some("notifications"), Some(id)) => {
                Some(Channel::UserNotifications { user_id: id.to_string() })
            }
            (Some("system"), Some("health"), None) => Some(Channel::SystemHealth),
            (Some("system"), Some("metrics"), None) => Some(Channel::SystemMetrics),
            (Some("system"), Some("dcg"), None) => Some(Channel::SystemDcg),
            _ => None,
        }
    }

    /// Whether this channel supports a `snapshot` fallback when a
    /// subscriber's cursor has been pruned past the retained window.
    pub fn supports_snapshot(&self) -> bool {
        matches!(
            self,
            Channel::WorkspaceAgents { .. } | Channel::SystemHealth | Channel::SystemDcg
        )
    }
}

/// The caller's identity and grants, as resolved by the HTTP layer before
/// a request reaches a subsystem (SPEC_FULL.md §4.C).
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub workspace_ids: Vec<String>,
    pub is_admin: bool,
}

impl AuthContext {
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Default::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() || self.api_key_id.is_some() || self.is_admin
    }

    pub fn is_workspace_member(&self, workspace_id: &str) -> bool {
        self.is_admin || self.workspace_ids.iter().any(|w| w == workspace_id)
    }
}
