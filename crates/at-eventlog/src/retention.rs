//! Per-channel-pattern retention: two independent caps (count, age). Both
//! are enforced on every append; exact-to-the-entry, even though the spec
//! permits amortising the sweep (SPEC_FULL.md §4.B).

use chrono::Duration;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub max_count: u64,
    pub max_age: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_count: 10_000,
            max_age: Duration::days(30),
        }
    }
}

/// Maps a channel's wire-name prefix (e.g. `"agent:output:"`) to a
/// retention policy, falling back to a default for unmatched channels.
#[derive(Debug, Clone)]
pub struct RetentionTable {
    default: RetentionPolicy,
    by_prefix: HashMap<String, RetentionPolicy>,
}

impl Default for RetentionTable {
    fn default() -> Self {
        let mut by_prefix = HashMap::new();
        by_prefix.insert(
            "agent:output:".to_string(),
            RetentionPolicy {
                max_count: 5_000,
                max_age: Duration::days(7),
            },
        );
        by_prefix.insert(
            "system:health".to_string(),
            RetentionPolicy {
                max_count: 500,
                max_age: Duration::days(1),
            },
        );
        Self {
            default: RetentionPolicy::default(),
            by_prefix,
        }
    }
}

impl RetentionTable {
    pub fn for_channel(&self, channel: &str) -> RetentionPolicy {
        self.by_prefix
            .iter()
            .filter(|(prefix, _)| channel.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, policy)| *policy)
            .unwrap_or(self.default)
    }

    pub fn set(&mut self, prefix: impl Into<String>, policy: RetentionPolicy) {
        self.by_prefix.insert(prefix.into(), policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_for_unmatched_channel() {
        let table = RetentionTable::default();
        let policy = table.for_channel("user:mail:u1");
        assert_eq!(policy.max_count, 10_000);
    }

    #[test]
    fn matches_longest_prefix() {
        let table = RetentionTable::default();
        let policy = table.for_channel("agent:output:a1");
        assert_eq!(policy.max_count, 5_000);
    }

    #[test]
    fn explicit_override_wins() {
        let mut table = RetentionTable::default();
        table.set(
            "system:health",
            RetentionPolicy {
                max_count: 1,
                max_age: Duration::hours(1),
            },
        );
        assert_eq!(table.for_channel("system:health").max_count, 1);
    }
}
