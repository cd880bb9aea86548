//! Pure candidate-selection logic for each rotation strategy
//! (SPEC_FULL.md §4.D). Takes a snapshot of profiles and the pool's
//! current state; does not mutate anything itself — the caller commits
//! the chosen id and advances `round_robin_cursor`.

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};

use crate::types::{Pool, Profile, ProfileStatus, RotationStrategy};

/// Select the next candidate profile for `pool`, excluding its currently
/// active profile. Returns `None` if no available candidate exists.
pub fn select_next(pool: &Pool, profiles: &[Profile], now: DateTime<Utc>) -> Option<String> {
    let mut available: Vec<&Profile> = profiles
        .iter()
        .filter(|p| p.workspace_id == pool.workspace_id && p.provider == pool.provider)
        .filter(|p| p.is_available(now))
        .filter(|p| Some(p.id.as_str()) != pool.active_profile_id.as_deref())
        .collect();

    if available.is_empty() {
        return None;
    }

    match pool.rotation_strategy {
        RotationStrategy::Smart => select_smart(&mut available),
        RotationStrategy::RoundRobin => select_round_robin(&mut available, pool.round_robin_cursor),
        RotationStrategy::LeastRecent => select_least_recent(&mut available),
        RotationStrategy::Random => select_random(&available),
    }
}

fn select_smart(available: &mut [&Profile]) -> Option<String> {
    available.sort_by(|a, b| {
        b.health_score
            .partial_cmp(&a.health_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.last_verified_at.cmp(&a.last_verified_at))
            .then_with(|| a.last_used_at.cmp(&b.last_used_at))
    });
    available
        .iter()
        .find(|p| p.status == ProfileStatus::Verified)
        .or_else(|| available.first())
        .map(|p| p.id.clone())
}

fn select_round_robin(available: &mut [&Profile], cursor: usize) -> Option<String> {
    available.sort_by(|a, b| a.id.cmp(&b.id));
    let idx = cursor % available.len();
    available.get(idx).map(|p| p.id.clone())
}

fn select_least_recent(available: &mut [&Profile]) -> Option<String> {
    available.sort_by(|a, b| a.last_used_at.cmp(&b.last_used_at));
    available.first().map(|p| p.id.clone())
}

fn select_random(available: &[&Profile]) -> Option<String> {
    if available.is_empty() {
        return None;
    }
    let rng = SystemRandom::new();
    let mut byte = [0u8; 1];
    rng.fill(&mut byte).expect("OS RNG unavailable");
    let idx = (byte[0] as usize) % available.len();
    available.get(idx).map(|p| p.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn profile(id: &str, health: f64, status: ProfileStatus) -> Profile {
        Profile {
            id: id.to_string(),
            workspace_id: "ws1".into(),
            provider: Provider::Claude,
            name: id.to_string(),
            auth_mode: "oauth".into(),
            labels: vec![],
            status,
            health_score: health,
            last_verified_at: None,
            last_used_at: None,
            cooldown_until: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn smart_picks_highest_health_among_verified() {
        let pool = Pool {
            rotation_strategy: RotationStrategy::Smart,
            ..Pool::new("ws1", Provider::Claude)
        };
        let profiles = vec![
            profile("a", 0.9, ProfileStatus::Verified),
            profile("b", 0.5, ProfileStatus::Verified),
        ];
        assert_eq!(select_next(&pool, &profiles, Utc::now()), Some("a".to_string()));
    }

    #[test]
    fn smart_falls_back_to_any_when_no_verified() {
        let pool = Pool {
            rotation_strategy: RotationStrategy::Smart,
            ..Pool::new("ws1", Provider::Claude)
        };
        let profiles = vec![profile("a", 0.9, ProfileStatus::Linked)];
        assert_eq!(select_next(&pool, &profiles, Utc::now()), Some("a".to_string()));
    }

    #[test]
    fn round_robin_advances_lexicographically() {
        let mut pool = Pool {
            rotation_strategy: RotationStrategy::RoundRobin,
            ..Pool::new("ws1", Provider::Claude)
        };
        let profiles = vec![
            profile("a", 1.0, ProfileStatus::Verified),
            profile("b", 1.0, ProfileStatus::Verified),
        ];
        pool.round_robin_cursor = 0;
        assert_eq!(select_next(&pool, &profiles, Utc::now()), Some("a".to_string()));
        pool.round_robin_cursor = 1;
        assert_eq!(select_next(&pool, &profiles, Utc::now()), Some("b".to_string()));
    }

    #[test]
    fn no_candidates_returns_none() {
        let pool = Pool::new("ws1", Provider::Claude);
        assert_eq!(select_next(&pool, &[], Utc::now()), None);
    }

    #[test]
    fn active_profile_is_excluded() {
        let mut pool = Pool::new("ws1", Provider::Claude);
        pool.active_profile_id = Some("a".to_string());
        let profiles = vec![profile("a", 1.0, ProfileStatus::Verified)];
        assert_eq!(select_next(&pool, &profiles, Utc::now()), None);
    }

    #[test]
    fn cooldown_profile_is_excluded() {
        let pool = Pool::new("ws1", Provider::Claude);
        let mut p = profile("a", 1.0, ProfileStatus::Verified);
        p.cooldown_until = Some(Utc::now() + chrono::Duration::minutes(10));
        assert_eq!(select_next(&pool, &[p], Utc::now()), None);
    }
}
