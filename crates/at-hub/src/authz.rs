//! Subscribe/publish authorisation policy (SPEC_FULL.md §4.C).

use at_core::types::{AuthContext, Channel};

use crate::error::HubError;

/// Resolves whether a user may access a given agent's channels when no
/// simpler rule (admin, workspace membership) already decides it.
pub trait AgentAccessResolver: Send + Sync {
    fn has_access(&self, agent_id: &str, user_id: Option<&str>, workspace_ids: &[String]) -> bool;
}

pub fn authorize_subscribe(
    auth: &AuthContext,
    channel: &Channel,
    agent_access: Option<&dyn AgentAccessResolver>,
) -> Result<(), HubError> {
    if auth.is_admin {
        return Ok(());
    }
    match channel {
        Channel::AgentOutput { agent_id } | Channel::AgentState { agent_id } | Channel::AgentTools { agent_id } => {
            if !auth.is_authenticated() {
                return Err(HubError::Unauthenticated);
            }
            match agent_access {
                Some(resolver) => {
                    if resolver.has_access(agent_id, auth.user_id.as_deref(), &auth.workspace_ids) {
                        Ok(())
                    } else {
                        Err(HubError::Forbidden(format!("no access to agent {agent_id}")))
                    }
                }
                None => Ok(()),
            }
        }
        Channel::WorkspaceAgents { workspace_id }
        | Channel::WorkspaceReservations { workspace_id }
        | Channel::WorkspaceConflicts { workspace_id } => {
            if auth.is_workspace_member(workspace_id) {
                Ok(())
            } else {
                Err(HubError::Forbidden(format!("not a member of {workspace_id}")))
            }
        }
        Channel::UserMail { user_id } | Channel::UserNotifications { user_id } => {
            if auth.user_id.as_deref() == Some(user_id.as_str()) {
                Ok(())
            } else {
                Err(HubError::Forbidden("channel belongs to a different user".into()))
            }
        }
        Channel::SystemHealth | Channel::SystemMetrics | Channel::SystemDcg => {
            if auth.is_authenticated() {
                Ok(())
            } else {
                Err(HubError::Unauthenticated)
            }
        }
    }
}

pub fn authorize_publish(auth: &AuthContext, channel: &Channel) -> Result<(), HubError> {
    if auth.is_admin {
        return Ok(());
    }
    match channel {
        Channel::AgentOutput { .. } | Channel::AgentState { .. } | Channel::AgentTools { .. } => {
            Err(HubError::Forbidden("only internal services publish agent events".into()))
        }
        Channel::WorkspaceAgents { workspace_id }
        | Channel::WorkspaceReservations { workspace_id }
        | Channel::WorkspaceConflicts { workspace_id } => {
            if auth.is_workspace_member(workspace_id) {
                Ok(())
            } else {
                Err(HubError::Forbidden(format!("not a member of {workspace_id}")))
            }
        }
        Channel::UserMail { .. } => {
            if auth.is_authenticated() {
                Ok(())
            } else {
                Err(HubError::Unauthenticated)
            }
        }
        Channel::UserNotifications { user_id } => {
            if auth.user_id.as_deref() == Some(user_id.as_str()) {
                Ok(())
            } else {
                Err(HubError::Forbidden("channel belongs to a different user".into()))
            }
        }
        Channel::SystemHealth | Channel::SystemMetrics | Channel::SystemDcg => {
            Err(HubError::Forbidden("system channel publish requires admin".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch_agent() -> Channel {
        Channel::AgentOutput { agent_id: "a1".into() }
    }

    #[test]
    fn admin_may_subscribe_and_publish_anywhere() {
        let auth = AuthContext::admin();
        assert!(authorize_subscribe(&auth, &ch_agent(), None).is_ok());
        assert!(authorize_publish(&auth, &ch_agent()).is_ok());
    }

    #[test]
    fn authenticated_user_may_subscribe_to_agent_channel_without_resolver() {
        let auth = AuthContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        assert!(authorize_subscribe(&auth, &ch_agent(), None).is_ok());
    }

    #[test]
    fn non_admin_cannot_publish_agent_events() {
        let auth = AuthContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        assert!(authorize_publish(&auth, &ch_agent()).is_err());
    }

    #[test]
    fn workspace_channel_requires_membership() {
        let ch = Channel::WorkspaceAgents {
            workspace_id: "ws1".into(),
        };
        let member = AuthContext {
            user_id: Some("u1".into()),
            workspace_ids: vec!["ws1".into()],
            ..Default::default()
        };
        let outsider = AuthContext {
            user_id: Some("u2".into()),
            workspace_ids: vec!["ws2".into()],
            ..Default::default()
        };
        assert!(authorize_subscribe(&member, &ch, None).is_ok());
        assert!(authorize_subscribe(&outsider, &ch, None).is_err());
    }

    #[test]
    fn anyone_authenticated_may_send_user_mail() {
        let auth = AuthContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        let ch = Channel::UserMail { user_id: "u2".into() };
        assert!(authorize_publish(&auth, &ch).is_ok());
    }

    #[test]
    fn user_notifications_publish_requires_matching_user() {
        let auth = AuthContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        let own = Channel::UserNotifications { user_id: "u1".into() };
        let other = Channel::UserNotifications { user_id: "u2".into() };
        assert!(authorize_publish(&auth, &own).is_ok());
        assert!(authorize_publish(&auth, &other).is_err());
    }

    #[test]
    fn system_channel_subscribe_requires_authentication_publish_requires_admin() {
        let auth = AuthContext {
            user_id: Some("u1".into()),
            ..Default::default()
        };
        assert!(authorize_subscribe(&auth, &Channel::SystemDcg, None).is_ok());
        assert!(authorize_publish(&auth, &Channel::SystemDcg).is_err());
    }
}
