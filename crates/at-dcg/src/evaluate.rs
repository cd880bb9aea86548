//! Rule evaluation (SPEC_FULL.md §4.F "Evaluation").

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::types::{AllowlistEntry, DcgConfig, EvaluationResult, Match, Mode, Pack, Pattern, Verdict};

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("(?s)^");
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            _ if glob_syntax::is_meta_character(c) => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('$');
    out
}

fn pattern_matches(pattern: &Pattern, command: &str) -> bool {
    match pattern {
        Pattern::Literal(needle) => command.to_lowercase().contains(&needle.to_lowercase()),
        Pattern::Glob(glob) => Regex::new(&glob_to_regex(glob))
            .map(|re| re.is_match(&command.to_lowercase()))
            .unwrap_or(false),
        Pattern::Regex(source) => regex::RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(command))
            .unwrap_or(false),
    }
}

fn pattern_text(pattern: &Pattern) -> String {
    match pattern {
        Pattern::Literal(s) | Pattern::Glob(s) | Pattern::Regex(s) => s.clone(),
    }
}

/// All rule matches across the given effective packs.
pub fn find_matches(packs: &[Pack], config: &DcgConfig, command: &str) -> Vec<Match> {
    packs
        .iter()
        .filter(|p| config.is_effective(&p.name))
        .flat_map(|pack| {
            pack.rules.iter().filter_map(move |rule| {
                if pattern_matches(&rule.pattern, command) {
                    Some(Match {
                        pack: pack.name.clone(),
                        rule_id: rule.rule_id.clone(),
                        pattern_text: pattern_text(&rule.pattern),
                        severity: rule.severity,
                        reason: rule.reason.clone(),
                        context_classification: rule.context_classification,
                    })
                } else {
                    None
                }
            })
        })
        .collect()
}

fn is_suppressed(m: &Match, allowlist: &[AllowlistEntry], command: &str, now: DateTime<Utc>) -> bool {
    allowlist
        .iter()
        .any(|entry| entry.rule_id == m.rule_id && entry.applies(command, now))
}

/// Evaluate `command`: find every match, suppress allowlisted ones, then
/// resolve severity → mode for whatever remains. Highest severity wins
/// ties broken by first match.
pub fn evaluate(packs: &[Pack], config: &DcgConfig, command: &str, now: DateTime<Utc>) -> (EvaluationResult, Vec<Match>) {
    let all_matches = find_matches(packs, config, command);
    let active: Vec<&Match> = all_matches
        .iter()
        .filter(|m| !is_suppressed(m, &config.allowlist, command, now))
        .collect();

    // `Iterator::max_by` keeps the *last* maximal element on ties; a
    // strict `>` fold keeps the first match instead, per the first-match
    // tie-break rule.
    let mut winner: Option<&Match> = None;
    for m in active.iter().copied() {
        if winner.map(|best| m.severity > best.severity).unwrap_or(true) {
            winner = Some(m);
        }
    }
    let winner = winner.cloned();

    let verdict = match &winner {
        None => Verdict::Allow,
        Some(m) => match config.mode_for(m.severity) {
            Mode::Deny => Verdict::Deny,
            Mode::Warn => Verdict::Warn,
            Mode::Log => Verdict::Log,
        },
    };

    (
        EvaluationResult {
            verdict,
            winning_match: winner,
        },
        all_matches,
    )
}

mod glob_syntax {
    pub fn is_meta_character(c: char) -> bool {
        matches!(
            c,
            '.' | '^' | '$' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '\\'
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packs::builtin_packs;
    use crate::types::{ContextClassification, Rule, Severity};

    fn rule(rule_id: &str, pattern: Pattern, severity: Severity) -> Rule {
        Rule {
            rule_id: rule_id.to_string(),
            pattern,
            severity,
            reason: "test".to_string(),
            context_classification: ContextClassification::Executed,
        }
    }

    #[test]
    fn literal_pattern_matches_substring() {
        let pack = Pack {
            name: "p".into(),
            version: "1".into(),
            rules: vec![rule("r1", Pattern::Literal("mkfs".into()), Severity::Critical)],
        };
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["p".into()];
        let matches = find_matches(&[pack], &config, "sudo mkfs.ext4 /dev/sdb1");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn glob_pattern_matches_wildcards() {
        let pack = Pack {
            name: "p".into(),
            version: "1".into(),
            rules: vec![rule("r1", Pattern::Glob("git push*--force*".into()), Severity::High)],
        };
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["p".into()];
        let matches = find_matches(&[pack], &config, "git push origin main --force");
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn regex_pattern_matches() {
        let pack = Pack {
            name: "p".into(),
            version: "1".into(),
            rules: vec![rule("r1", Pattern::Regex(r"rm\s+-rf\s+/$".into()), Severity::Critical)],
        };
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["p".into()];
        assert_eq!(find_matches(&[pack], &config, "rm -rf /").len(), 1);
    }

    #[test]
    fn disabled_pack_is_not_effective() {
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["fs-destructive".into()];
        config.disabled_packs = vec!["fs-destructive".into()];
        let matches = find_matches(&builtin_packs(), &config, "mkfs.ext4 /dev/sdb1");
        assert!(matches.is_empty());
    }

    #[test]
    fn highest_severity_wins_when_multiple_rules_match() {
        let config = DcgConfig::default();
        let (result, _) = evaluate(&builtin_packs(), &config, "rm -rf / && git clean -fdx", Utc::now());
        assert_eq!(result.winning_match.unwrap().severity, Severity::Critical);
    }

    #[test]
    fn allowlisted_rule_is_suppressed() {
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["git-destructive".into()];
        config.allowlist.push(AllowlistEntry {
            rule_id: "git-reset-hard".to_string(),
            condition: None,
            expires_at: None,
        });
        let (result, _) = evaluate(&builtin_packs(), &config, "git reset --hard", Utc::now());
        assert_eq!(result.verdict, Verdict::Allow);
    }

    #[test]
    fn expired_allowlist_entry_no_longer_suppresses() {
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["git-destructive".into()];
        config.allowlist.push(AllowlistEntry {
            rule_id: "git-reset-hard".to_string(),
            condition: None,
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
        });
        let (result, _) = evaluate(&builtin_packs(), &config, "git reset --hard", Utc::now());
        assert_eq!(result.verdict, Verdict::Deny);
    }

    #[test]
    fn same_severity_tie_keeps_first_matching_rule() {
        let pack = Pack {
            name: "p".into(),
            version: "1".into(),
            rules: vec![
                rule("first", Pattern::Literal("rm -rf".into()), Severity::Critical),
                rule("second", Pattern::Literal("rm -rf".into()), Severity::Critical),
            ],
        };
        let mut config = DcgConfig::default();
        config.enabled_packs = vec!["p".into()];
        let (result, _) = evaluate(&[pack], &config, "rm -rf /tmp/x", Utc::now());
        assert_eq!(result.winning_match.unwrap().rule_id, "first");
    }

    #[test]
    fn no_match_allows() {
        let config = DcgConfig::default();
        let (result, _) = evaluate(&builtin_packs(), &config, "ls -la", Utc::now());
        assert_eq!(result.verdict, Verdict::Allow);
    }
}
