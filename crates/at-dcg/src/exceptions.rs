//! Allow-once exception workflow (SPEC_FULL.md §4.F "Allow-once exception").

use chrono::{DateTime, Duration, Utc};
use ring::digest;

use crate::types::{AllowOnceException, ExceptionStatus};

/// A short, human-friendly code an operator can read aloud, distinct
/// from the SHA-256 command hash used for one-time-use verification.
pub fn generate_code() -> String {
    let id = at_core::ids::new_id("exc");
    id.split_once('_').map(|(_, s)| s[..6].to_string()).unwrap_or(id)
}

pub fn hash_command(command: &str) -> String {
    let digest = digest::digest(&digest::SHA256, command.as_bytes());
    digest
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn new_exception(command: &str, rule_ids: Vec<String>, ttl_secs: i64, now: DateTime<Utc>) -> AllowOnceException {
    AllowOnceException {
        code: generate_code(),
        command: command.to_string(),
        command_hash: hash_command(command),
        rule_ids,
        status: ExceptionStatus::Pending,
        created_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
        decided_by: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_the_same_command() {
        assert_eq!(hash_command("git push --force"), hash_command("git push --force"));
    }

    #[test]
    fn hash_differs_for_different_commands() {
        assert_ne!(hash_command("a"), hash_command("b"));
    }

    #[test]
    fn new_exception_starts_pending() {
        let exc = new_exception("rm -rf /tmp/x", vec!["fs-rm-rf-root".into()], 300, Utc::now());
        assert_eq!(exc.status, ExceptionStatus::Pending);
        assert!(exc.expires_at > exc.created_at);
    }
}
