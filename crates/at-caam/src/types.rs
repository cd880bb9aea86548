use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Claude,
    Codex,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
            Provider::Gemini => "gemini",
        }
    }

    /// Design-target default cooldown when no pool- or config-level
    /// override applies: Claude > Codex ≥ Gemini (SPEC_FULL.md §4.D).
    pub fn default_cooldown_minutes(&self) -> u32 {
        match self {
            Provider::Claude => 60,
            Provider::Codex => 30,
            Provider::Gemini => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Linked,
    Verified,
    Error,
    Unlinked,
    Cooldown,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    Smart,
    RoundRobin,
    LeastRecent,
    Random,
}

impl Default for RotationStrategy {
    fn default() -> Self {
        RotationStrategy::Smart
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub workspace_id: String,
    pub provider: Provider,
    pub name: String,
    pub auth_mode: String,
    pub labels: Vec<String>,
    pub status: ProfileStatus,
    pub health_score: f64,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ProfileStatus::Linked | ProfileStatus::Verified)
            && self.cooldown_until.map(|until| until <= now).unwrap_or(true)
    }

    /// A state read must auto-transition `cooldown` back to `linked` once
    /// `cooldown_until` has passed (SPEC_FULL.md §3 profile invariant).
    pub fn revert_expired_cooldown(&mut self, now: DateTime<Utc>) {
        if self.status == ProfileStatus::Cooldown
            && self.cooldown_until.map(|until| until <= now).unwrap_or(true)
        {
            self.status = ProfileStatus::Linked;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pool {
    pub workspace_id: String,
    pub provider: Provider,
    pub active_profile_id: Option<String>,
    pub rotation_strategy: RotationStrategy,
    pub round_robin_cursor: usize,
    pub cooldown_minutes_default: Option<u32>,
}

impl Pool {
    pub fn new(workspace_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            provider,
            active_profile_id: None,
            rotation_strategy: RotationStrategy::default(),
            round_robin_cursor: 0,
            cooldown_minutes_default: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationResult {
    pub success: bool,
    pub previous_profile_id: Option<String>,
    pub new_profile_id: Option<String>,
    pub retries_remaining: u32,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfileSummary {
    pub verified: u32,
    pub in_cooldown: u32,
    pub error: u32,
    pub unlinked: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByoaStatus {
    pub ready: bool,
    pub verified_providers: Vec<Provider>,
    pub profile_summary: ProfileSummary,
    pub recommended_action: Option<String>,
}

/// A field-level patch applied by `updateProfile`; unset fields are left
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub labels: Option<Vec<String>>,
    pub status: Option<ProfileStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_in_cooldown_is_not_available() {
        let mut p = sample_profile();
        p.cooldown_until = Some(Utc::now() + chrono::Duration::minutes(5));
        assert!(!p.is_available(Utc::now()));
    }

    #[test]
    fn profile_with_expired_cooldown_is_available() {
        let mut p = sample_profile();
        p.cooldown_until = Some(Utc::now() - chrono::Duration::minutes(5));
        assert!(p.is_available(Utc::now()));
    }

    #[test]
    fn error_status_is_never_available() {
        let mut p = sample_profile();
        p.status = ProfileStatus::Error;
        assert!(!p.is_available(Utc::now()));
    }

    #[test]
    fn expired_cooldown_reverts_status_to_linked() {
        let mut p = sample_profile();
        p.status = ProfileStatus::Cooldown;
        p.cooldown_until = Some(Utc::now() - chrono::Duration::minutes(1));
        p.revert_expired_cooldown(Utc::now());
        assert_eq!(p.status, ProfileStatus::Linked);
    }

    #[test]
    fn active_cooldown_does_not_revert() {
        let mut p = sample_profile();
        p.status = ProfileStatus::Cooldown;
        p.cooldown_until = Some(Utc::now() + chrono::Duration::minutes(5));
        p.revert_expired_cooldown(Utc::now());
        assert_eq!(p.status, ProfileStatus::Cooldown);
    }

    fn sample_profile() -> Profile {
        Profile {
            id: "prof_1".into(),
            workspace_id: "ws1".into(),
            provider: Provider::Claude,
            name: "default".into(),
            auth_mode: "oauth".into(),
            labels: vec![],
            status: ProfileStatus::Linked,
            health_score: 1.0,
            last_verified_at: None,
            last_used_at: None,
            cooldown_until: None,
            created_at: Utc::now(),
        }
    }
}
