//! Credential redaction shared by the DCG policy engine and the audit
//! sink (SPEC_FULL.md §4.F, §4.G) — both persist operator-facing strings
//! that must never carry a live secret.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

const REPLACEMENT: &str = "[REDACTED]";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let sources = [
            r"(password\s*[:=]\s*)(\S+)",
            r"(api[_-]?key\s*[:=]\s*)(\S+)",
            r"(token\s*[:=]\s*)(\S+)",
            r"(secret\s*[:=]\s*)(\S+)",
            // Matches the common `Authorization: Bearer <token>` shape in
            // one pass before the bare `bearer <token>` pattern below runs.
            r"(authorization\s*:\s*)(?:bearer\s+)?(\S+)",
            r"(bearer\s+)(\S+)",
        ];
        sources
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .expect("static redaction pattern is valid")
            })
            .collect()
    })
}

/// Replace the value token following a known credential marker with
/// `[REDACTED]`, leaving everything else (including the marker itself)
/// untouched.
pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for re in patterns() {
        out = re.replace_all(&out, |caps: &regex::Captures| format!("{}{REPLACEMENT}", &caps[1])).into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_password_assignment() {
        assert_eq!(redact("password=hunter2"), "password=[REDACTED]");
    }

    #[test]
    fn redacts_api_key_with_colon() {
        assert_eq!(redact("api_key: sk-abc123"), "api_key: [REDACTED]");
    }

    #[test]
    fn redacts_bearer_token_case_insensitively() {
        assert_eq!(
            redact("curl -H 'Authorization: Bearer secret123' https://api.example.com"),
            "curl -H 'authorization: [REDACTED]' https://api.example.com"
        );
    }

    #[test]
    fn leaves_unrelated_text_untouched() {
        assert_eq!(redact("git push origin main"), "git push origin main");
    }

    #[test]
    fn redacts_multiple_markers_in_one_string() {
        let input = "token=abc secret=xyz";
        let out = redact(input);
        assert!(out.contains("token=[REDACTED]"));
        assert!(out.contains("secret=[REDACTED]"));
    }
}
