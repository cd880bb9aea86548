//! Built-in rule packs (SPEC_FULL.md §4.F expansion). Pack content is
//! plain Rust data rather than loaded from external files — the pack
//! *catalogue* is in scope here, not a plugin system for authoring new
//! ones.

use crate::types::{ContextClassification, Pack, Pattern, Rule, Severity};

fn rule(rule_id: &str, pattern: Pattern, severity: Severity, reason: &str, ctx: ContextClassification) -> Rule {
    Rule {
        rule_id: rule_id.to_string(),
        pattern,
        severity,
        reason: reason.to_string(),
        context_classification: ctx,
    }
}

fn fs_destructive() -> Pack {
    Pack {
        name: "fs-destructive".to_string(),
        version: "1.0.0".to_string(),
        rules: vec![
            rule(
                "fs-rm-rf-root",
                Pattern::Regex(r"rm\s+-rf\s+/(\s|$)".to_string()),
                Severity::Critical,
                "recursive force-delete of the filesystem root",
                ContextClassification::Executed,
            ),
            rule(
                "fs-rm-rf-home",
                Pattern::Regex(r"rm\s+-rf\s+~".to_string()),
                Severity::Critical,
                "recursive force-delete of the home directory",
                ContextClassification::Executed,
            ),
            rule(
                "fs-mkfs",
                Pattern::Literal("mkfs".to_string()),
                Severity::Critical,
                "formats a filesystem, destroying existing data",
                ContextClassification::Executed,
            ),
            rule(
                "fs-dd-to-device",
                Pattern::Regex(r"dd\s+if=.*\s+of=/dev/".to_string()),
                Severity::Critical,
                "writes raw bytes directly to a block device",
                ContextClassification::Executed,
            ),
        ],
    }
}

fn git_destructive() -> Pack {
    Pack {
        name: "git-destructive".to_string(),
        version: "1.0.0".to_string(),
        rules: vec![
            rule(
                "git-push-force",
                Pattern::Glob("git push*--force*".to_string()),
                Severity::High,
                "force-push can overwrite remote history other agents depend on",
                ContextClassification::Executed,
            ),
            rule(
                "git-reset-hard",
                Pattern::Literal("git reset --hard".to_string()),
                Severity::High,
                "discards uncommitted work with no recovery path",
                ContextClassification::Executed,
            ),
            rule(
                "git-clean-fdx",
                Pattern::Literal("git clean -fdx".to_string()),
                Severity::Medium,
                "removes untracked and ignored files",
                ContextClassification::Executed,
            ),
        ],
    }
}

fn secrets_exposure() -> Pack {
    Pack {
        name: "secrets-exposure".to_string(),
        version: "1.0.0".to_string(),
        rules: vec![
            rule(
                "secrets-echo-env",
                Pattern::Regex(r"echo\s+\$[A-Z_]*(KEY|TOKEN|SECRET|PASSWORD)".to_string()),
                Severity::High,
                "prints a credential-shaped environment variable to stdout",
                ContextClassification::Ambiguous,
            ),
            rule(
                "secrets-cat-env-file",
                Pattern::Glob("cat *.env".to_string()),
                Severity::Medium,
                "dumps a dotenv file that likely contains credentials",
                ContextClassification::Data,
            ),
        ],
    }
}

pub fn builtin_packs() -> Vec<Pack> {
    vec![fs_destructive(), git_destructive(), secrets_exposure()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ships_exactly_the_three_named_packs() {
        let names: Vec<&str> = builtin_packs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["fs-destructive", "git-destructive", "secrets-exposure"]);
    }

    #[test]
    fn every_rule_id_is_unique_within_its_pack() {
        for pack in builtin_packs() {
            let mut seen = std::collections::HashSet::new();
            for r in &pack.rules {
                assert!(seen.insert(r.rule_id.clone()), "duplicate rule id in {}", pack.name);
            }
        }
    }
}
