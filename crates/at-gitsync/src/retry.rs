//! Error-text retry classification and exponential backoff with jitter
//! (SPEC_FULL.md §4.E).

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryCode {
    AuthError,
    Conflict,
    Network,
    RateLimit,
    Unknown,
}

impl RetryCode {
    pub fn retryable(&self) -> bool {
        !matches!(self, RetryCode::AuthError | RetryCode::Conflict)
    }

    /// Longer backoff applies to rate-limit failures (SPEC_FULL.md §4.E).
    pub fn backoff_multiplier(&self) -> u32 {
        match self {
            RetryCode::RateLimit => 4,
            _ => 1,
        }
    }
}

const AUTH_PATTERNS: &[&str] = &["permission denied", "authentication failed", "publickey"];
const CONFLICT_PATTERNS: &[&str] = &["conflict", "merge failed", "non-fast-forward"];
const NETWORK_PATTERNS: &[&str] = &["connection refused", "could not resolve", "timeout", "network"];
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "429"];

pub fn classify(error_text: &str) -> RetryCode {
    let lower = error_text.to_lowercase();
    if AUTH_PATTERNS.iter().any(|p| lower.contains(p)) {
        RetryCode::AuthError
    } else if CONFLICT_PATTERNS.iter().any(|p| lower.contains(p)) {
        RetryCode::Conflict
    } else if NETWORK_PATTERNS.iter().any(|p| lower.contains(p)) {
        RetryCode::Network
    } else if RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p)) {
        RetryCode::RateLimit
    } else {
        RetryCode::Unknown
    }
}

const MAX_DELAY_MS: u64 = 5 * 60 * 1000;

/// `baseDelay · 2^(attempt-1)` with ±20% jitter, capped at `MAX_DELAY_MS`.
pub fn backoff(base_delay_ms: u64, attempt: u32, code: RetryCode) -> Duration {
    let exp = base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
    let with_multiplier = exp.saturating_mul(code.backoff_multiplier() as u64);
    let capped = with_multiplier.min(MAX_DELAY_MS);
    let jitter_fraction = random_unit_interval() * 0.4 - 0.2; // [-0.2, 0.2]
    let jittered = (capped as f64) * (1.0 + jitter_fraction);
    Duration::from_millis(jittered.max(0.0) as u64)
}

fn random_unit_interval() -> f64 {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes).expect("OS RNG unavailable");
    (u32::from_le_bytes(bytes) as f64) / (u32::MAX as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_errors_as_non_retryable() {
        assert_eq!(classify("Permission denied (publickey)"), RetryCode::AuthError);
        assert!(!RetryCode::AuthError.retryable());
    }

    #[test]
    fn classifies_conflicts_as_non_retryable() {
        assert_eq!(classify("merge failed: conflict in file.rs"), RetryCode::Conflict);
        assert!(!RetryCode::Conflict.retryable());
    }

    #[test]
    fn classifies_network_errors_as_retryable() {
        assert_eq!(classify("connection refused"), RetryCode::Network);
        assert!(RetryCode::Network.retryable());
    }

    #[test]
    fn classifies_rate_limit_with_longer_backoff() {
        assert_eq!(classify("HTTP 429 rate limit exceeded"), RetryCode::RateLimit);
        assert!(RetryCode::RateLimit.backoff_multiplier() > RetryCode::Network.backoff_multiplier());
    }

    #[test]
    fn classifies_unknown_as_retryable() {
        assert_eq!(classify("something weird happened"), RetryCode::Unknown);
        assert!(RetryCode::Unknown.retryable());
    }

    #[test]
    fn backoff_grows_exponentially_before_the_cap() {
        let d1 = backoff(1000, 1, RetryCode::Network);
        let d2 = backoff(1000, 2, RetryCode::Network);
        // allow for jitter but the base should roughly double
        assert!(d2.as_millis() as f64 > d1.as_millis() as f64 * 1.2);
    }

    #[test]
    fn backoff_is_capped() {
        let d = backoff(1_000_000, 10, RetryCode::RateLimit);
        assert!(d.as_millis() as u64 <= (MAX_DELAY_MS as f64 * 1.2) as u64);
    }
}
