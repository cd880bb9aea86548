//! Credential-pool rotator (SPEC_FULL.md §4.D): profile lifecycle, smart
//! rotation among provider accounts, cooldown on rate-limit signatures,
//! and failure-driven failover.

mod error;
mod rotation;
mod signatures;
mod types;

pub use error::CaamError;
pub use signatures::is_rate_limit_error;
pub use types::{
    ByoaStatus, Pool, Profile, ProfilePatch, ProfileStatus, ProfileSummary, Provider,
    RotationResult, RotationStrategy,
};

use std::str::FromStr;
use std::sync::Arc;

use at_core::config::CaamConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::instrument;

impl FromStr for Provider {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Provider::Claude),
            "codex" => Ok(Provider::Codex),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(()),
        }
    }
}

type PoolKey = (String, Provider);

/// Owns every pool's rotation state and every profile. Each pool's state
/// lives behind its own `tokio::sync::Mutex` inside a `DashMap`, so
/// rotations on different pools never contend with each other
/// (SPEC_FULL.md §4.D expansion).
pub struct Caam {
    config: CaamConfig,
    pools: DashMap<PoolKey, Arc<Mutex<Pool>>>,
    profiles: DashMap<String, Profile>,
}

impl Caam {
    pub fn new(config: CaamConfig) -> Self {
        Self {
            config,
            pools: DashMap::new(),
            profiles: DashMap::new(),
        }
    }

    fn cooldown_minutes_for(&self, pool: &Pool) -> u32 {
        pool.cooldown_minutes_default.unwrap_or_else(|| {
            self.config
                .cooldown_minutes
                .get(pool.provider.as_str())
                .copied()
                .unwrap_or_else(|| pool.provider.default_cooldown_minutes())
        })
    }

    fn pool_for(&self, workspace_id: &str, provider: Provider) -> Arc<Mutex<Pool>> {
        self.pools
            .entry((workspace_id.to_string(), provider))
            .or_insert_with(|| Arc::new(Mutex::new(Pool::new(workspace_id, provider))))
            .clone()
    }

    fn profiles_for(&self, workspace_id: &str, provider: Provider) -> Vec<Profile> {
        let now = Utc::now();
        self.profiles
            .iter_mut()
            .filter(|entry| entry.workspace_id == workspace_id && entry.provider == provider)
            .map(|mut entry| {
                entry.revert_expired_cooldown(now);
                entry.clone()
            })
            .collect()
    }

    #[instrument(skip(self))]
    pub fn create_profile(
        &self,
        workspace_id: &str,
        provider: Provider,
        name: &str,
        auth_mode: &str,
        labels: Vec<String>,
    ) -> Profile {
        self.pool_for(workspace_id, provider);
        let profile = Profile {
            id: at_core::ids::new_id("prof"),
            workspace_id: workspace_id.to_string(),
            provider,
            name: name.to_string(),
            auth_mode: auth_mode.to_string(),
            labels,
            status: ProfileStatus::Linked,
            health_score: 1.0,
            last_verified_at: None,
            last_used_at: None,
            cooldown_until: None,
            created_at: Utc::now(),
        };
        self.profiles.insert(profile.id.clone(), profile.clone());
        profile
    }

    pub async fn activate_profile(&self, id: &str) -> Result<Profile, CaamError> {
        let mut entry = self
            .profiles
            .get_mut(id)
            .ok_or_else(|| CaamError::ProfileNotFound(id.to_string()))?;
        entry.revert_expired_cooldown(Utc::now());
        entry.last_used_at = Some(Utc::now());
        let (workspace_id, provider) = (entry.workspace_id.clone(), entry.provider);
        let profile = entry.clone();
        drop(entry);

        let pool = self.pool_for(&workspace_id, provider);
        pool.lock().await.active_profile_id = Some(id.to_string());
        Ok(profile)
    }

    pub fn mark_verified(&self, id: &str) -> Result<Profile, CaamError> {
        let mut entry = self
            .profiles
            .get_mut(id)
            .ok_or_else(|| CaamError::ProfileNotFound(id.to_string()))?;
        entry.status = ProfileStatus::Verified;
        entry.last_verified_at = Some(Utc::now());
        Ok(entry.clone())
    }

    pub fn set_cooldown(&self, id: &str, minutes: u32) -> Result<Profile, CaamError> {
        let mut entry = self
            .profiles
            .get_mut(id)
            .ok_or_else(|| CaamError::ProfileNotFound(id.to_string()))?;
        entry.cooldown_until = Some(Utc::now() + chrono::Duration::minutes(minutes as i64));
        entry.status = ProfileStatus::Cooldown;
        Ok(entry.clone())
    }

    pub fn get_profile(&self, id: &str) -> Option<Profile> {
        let mut entry = self.profiles.get_mut(id)?;
        entry.revert_expired_cooldown(Utc::now());
        Some(entry.clone())
    }

    pub fn list_profiles(&self, workspace_id: &str) -> Vec<Profile> {
        let now = Utc::now();
        self.profiles
            .iter_mut()
            .filter(|entry| entry.workspace_id == workspace_id)
            .map(|mut entry| {
                entry.revert_expired_cooldown(now);
                entry.clone()
            })
            .collect()
    }

    pub async fn delete_profile(&self, id: &str) -> Result<(), CaamError> {
        let (_, profile) = self
            .profiles
            .remove(id)
            .ok_or_else(|| CaamError::ProfileNotFound(id.to_string()))?;
        let pool = self.pool_for(&profile.workspace_id, profile.provider);
        let mut pool = pool.lock().await;
        if pool.active_profile_id.as_deref() == Some(id) {
            pool.active_profile_id = None;
        }
        Ok(())
    }

    pub fn update_profile(&self, id: &str, patch: ProfilePatch) -> Result<Profile, CaamError> {
        let mut entry = self
            .profiles
            .get_mut(id)
            .ok_or_else(|| CaamError::ProfileNotFound(id.to_string()))?;
        if let Some(name) = patch.name {
            entry.name = name;
        }
        if let Some(labels) = patch.labels {
            entry.labels = labels;
        }
        if let Some(status) = patch.status {
            entry.status = status;
        }
        Ok(entry.clone())
    }

    /// Pure preview of the next rotation candidate; no mutation.
    pub async fn peek_next_profile(&self, workspace_id: &str, provider: Provider) -> Option<Profile> {
        let pool = self.pools.get(&(workspace_id.to_string(), provider))?.clone();
        let pool = pool.lock().await;
        let profiles = self.profiles_for(workspace_id, provider);
        let id = rotation::select_next(&pool, &profiles, Utc::now())?;
        self.profiles.get(&id).map(|p| p.clone())
    }

    #[instrument(skip(self))]
    pub async fn rotate(
        &self,
        workspace_id: &str,
        provider: Provider,
        reason: Option<&str>,
    ) -> RotationResult {
        let Some(pool_arc) = self.pools.get(&(workspace_id.to_string(), provider)).map(|p| p.clone()) else {
            return RotationResult {
                success: false,
                previous_profile_id: None,
                new_profile_id: None,
                retries_remaining: 0,
                reason: Some("No pool found".to_string()),
            };
        };

        let mut pool = pool_arc.lock().await;
        let profiles = self.profiles_for(workspace_id, provider);
        let previous = pool.active_profile_id.clone();

        match rotation::select_next(&pool, &profiles, Utc::now()) {
            Some(new_id) => {
                if pool.rotation_strategy == RotationStrategy::RoundRobin {
                    pool.round_robin_cursor = pool.round_robin_cursor.wrapping_add(1);
                }
                pool.active_profile_id = Some(new_id.clone());
                drop(pool);
                if let Some(mut entry) = self.profiles.get_mut(&new_id) {
                    entry.last_used_at = Some(Utc::now());
                }
                RotationResult {
                    success: true,
                    previous_profile_id: previous,
                    new_profile_id: Some(new_id),
                    retries_remaining: profiles.len() as u32,
                    reason: reason.map(|s| s.to_string()),
                }
            }
            None => RotationResult {
                success: false,
                previous_profile_id: previous,
                new_profile_id: None,
                retries_remaining: 0,
                reason: Some("No available profiles".to_string()),
            },
        }
    }

    /// Puts the pool's current active profile in cooldown, then rotates.
    #[instrument(skip(self))]
    pub async fn handle_rate_limit(
        &self,
        workspace_id: &str,
        provider: Provider,
        error_text: Option<&str>,
    ) -> RotationResult {
        let Some(pool_arc) = self.pools.get(&(workspace_id.to_string(), provider)).map(|p| p.clone()) else {
            return RotationResult {
                success: false,
                previous_profile_id: None,
                new_profile_id: None,
                retries_remaining: 0,
                reason: Some("No pool found".to_string()),
            };
        };

        let active_id = {
            let pool = pool_arc.lock().await;
            pool.active_profile_id.clone()
        };

        let Some(active_id) = active_id else {
            return RotationResult {
                success: false,
                previous_profile_id: None,
                new_profile_id: None,
                retries_remaining: 0,
                reason: Some("No active profile".to_string()),
            };
        };

        let cooldown_minutes = {
            let pool = pool_arc.lock().await;
            self.cooldown_minutes_for(&pool)
        };
        if let Some(mut entry) = self.profiles.get_mut(&active_id) {
            entry.cooldown_until = Some(Utc::now() + chrono::Duration::minutes(cooldown_minutes as i64));
            entry.status = ProfileStatus::Cooldown;
        }

        self.rotate(workspace_id, provider, error_text).await
    }

    pub fn get_byoa_status(&self, workspace_id: &str) -> ByoaStatus {
        let now = Utc::now();
        let profiles: Vec<Profile> = self
            .profiles
            .iter_mut()
            .filter(|p| p.workspace_id == workspace_id)
            .map(|mut p| {
                p.revert_expired_cooldown(now);
                p.clone()
            })
            .collect();

        let mut summary = ProfileSummary::default();
        let mut verified_providers = Vec::new();
        for p in &profiles {
            match p.status {
                ProfileStatus::Verified => {
                    summary.verified += 1;
                    if !verified_providers.contains(&p.provider) {
                        verified_providers.push(p.provider);
                    }
                }
                ProfileStatus::Error => summary.error += 1,
                ProfileStatus::Unlinked => summary.unlinked += 1,
                ProfileStatus::Cooldown => summary.in_cooldown += 1,
                ProfileStatus::Expired | ProfileStatus::Linked => {}
            }
        }

        let ready = summary.verified > 0;
        let recommended_action = if !ready {
            Some("Link and verify at least one provider profile".to_string())
        } else {
            None
        };

        ByoaStatus {
            ready,
            verified_providers,
            profile_summary: summary,
            recommended_action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caam() -> Caam {
        Caam::new(CaamConfig::default())
    }

    #[tokio::test]
    async fn rotate_with_no_pool_reports_no_pool_found() {
        let caam = caam();
        let result = caam.rotate("ws1", Provider::Claude, None).await;
        assert!(!result.success);
        assert_eq!(result.reason.as_deref(), Some("No pool found"));
    }

    #[tokio::test]
    async fn create_profile_then_rotate_activates_it() {
        let caam = caam();
        let p = caam.create_profile("ws1", Provider::Claude, "acct1", "oauth", vec![]);
        caam.mark_verified(&p.id).unwrap();
        let result = caam.rotate("ws1", Provider::Claude, None).await;
        assert!(result.success);
        assert_eq!(result.new_profile_id, Some(p.id));
    }

    #[tokio::test]
    async fn rotate_excludes_currently_active_profile() {
        let caam = caam();
        let p1 = caam.create_profile("ws1", Provider::Claude, "a1", "oauth", vec![]);
        caam.mark_verified(&p1.id).unwrap();
        let first = caam.rotate("ws1", Provider::Claude, None).await;
        assert_eq!(first.new_profile_id, Some(p1.id.clone()));

        // only one profile exists, so a second rotation has no candidate
        let second = caam.rotate("ws1", Provider::Claude, None).await;
        assert!(!second.success);
    }

    #[tokio::test]
    async fn handle_rate_limit_without_active_profile_reports_reason() {
        let caam = caam();
        caam.create_profile("ws1", Provider::Claude, "a1", "oauth", vec![]);
        let result = caam.handle_rate_limit("ws1", Provider::Claude, None).await;
        assert!(!result.success);
        assert_eq!(result.reason.as_deref(), Some("No active profile"));
    }

    #[tokio::test]
    async fn handle_rate_limit_applies_cooldown_and_rotates() {
        let caam = caam();
        let p1 = caam.create_profile("ws1", Provider::Claude, "a1", "oauth", vec![]);
        let p2 = caam.create_profile("ws1", Provider::Claude, "a2", "oauth", vec![]);
        caam.mark_verified(&p1.id).unwrap();
        caam.mark_verified(&p2.id).unwrap();
        caam.activate_profile(&p1.id).await.unwrap();

        let result = caam.handle_rate_limit("ws1", Provider::Claude, Some("rate_limit_error")).await;
        assert!(result.success);
        assert_eq!(result.new_profile_id, Some(p2.id));

        let cooled = caam.profiles.get(&p1.id).unwrap().clone();
        assert!(cooled.cooldown_until.is_some());
        assert_eq!(cooled.status, ProfileStatus::Cooldown);
    }

    #[tokio::test]
    async fn cooldown_reverts_to_linked_once_expired() {
        let caam = caam();
        let p1 = caam.create_profile("ws1", Provider::Claude, "a1", "oauth", vec![]);
        caam.mark_verified(&p1.id).unwrap();
        caam.set_cooldown(&p1.id, 10).unwrap();
        assert_eq!(caam.get_profile(&p1.id).unwrap().status, ProfileStatus::Cooldown);

        // Backdate cooldown_until so the next read observes it as expired.
        {
            let mut entry = caam.profiles.get_mut(&p1.id).unwrap();
            entry.cooldown_until = Some(Utc::now() - chrono::Duration::minutes(1));
        }
        let reverted = caam.get_profile(&p1.id).unwrap();
        assert_eq!(reverted.status, ProfileStatus::Linked);
    }

    #[test]
    fn byoa_status_not_ready_with_no_verified_profiles() {
        let caam = caam();
        caam.create_profile("ws1", Provider::Claude, "a1", "oauth", vec![]);
        let status = caam.get_byoa_status("ws1");
        assert!(!status.ready);
        assert!(status.recommended_action.is_some());
    }

    #[test]
    fn byoa_status_ready_once_a_profile_is_verified() {
        let caam = caam();
        let p = caam.create_profile("ws1", Provider::Claude, "a1", "oauth", vec![]);
        caam.mark_verified(&p.id).unwrap();
        let status = caam.get_byoa_status("ws1");
        assert!(status.ready);
        assert_eq!(status.verified_providers, vec![Provider::Claude]);
    }
}
