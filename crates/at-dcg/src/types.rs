use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn default_mode(&self) -> Mode {
        match self {
            Severity::Critical | Severity::High => Mode::Deny,
            Severity::Medium => Mode::Warn,
            Severity::Low => Mode::Log,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Deny,
    Warn,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextClassification {
    Executed,
    Data,
    Ambiguous,
}

/// A rule's match shape — the implementation must distinguish these at
/// evaluation time rather than treating every pattern as a regex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    Literal(String),
    Glob(String),
    Regex(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub pattern: Pattern,
    pub severity: Severity,
    pub reason: String,
    pub context_classification: ContextClassification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub name: String,
    pub version: String,
    pub rules: Vec<Rule>,
}

/// One fired rule against an evaluated command, before allowlist
/// suppression and severity resolution.
#[derive(Debug, Clone)]
pub struct Match {
    pub pack: String,
    pub rule_id: String,
    pub pattern_text: String,
    pub severity: Severity,
    pub reason: String,
    pub context_classification: ContextClassification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Deny,
    Warn,
    Log,
    Allow,
}

/// Result of evaluating a command against the effective rule set.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub verdict: Verdict,
    pub winning_match: Option<Match>,
}

/// An allowlist suppression, keyed by rule id with an optional condition
/// (a literal substring the command must contain to qualify) and expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub rule_id: String,
    pub condition: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AllowlistEntry {
    pub fn applies(&self, command: &str, now: DateTime<Utc>) -> bool {
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return false;
            }
        }
        match &self.condition {
            Some(cond) => command.contains(cond.as_str()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcgConfig {
    pub enabled_packs: Vec<String>,
    pub disabled_packs: Vec<String>,
    pub severity_modes: std::collections::HashMap<Severity, Mode>,
    pub allowlist: Vec<AllowlistEntry>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for DcgConfig {
    fn default() -> Self {
        let mut severity_modes = std::collections::HashMap::new();
        for s in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
            severity_modes.insert(s, s.default_mode());
        }
        Self {
            enabled_packs: vec![
                "fs-destructive".to_string(),
                "git-destructive".to_string(),
                "secrets-exposure".to_string(),
            ],
            disabled_packs: Vec::new(),
            severity_modes,
            allowlist: Vec::new(),
            updated_by: "system".to_string(),
            updated_at: Utc::now(),
        }
    }
}

impl DcgConfig {
    pub fn is_effective(&self, pack_name: &str) -> bool {
        self.enabled_packs.iter().any(|p| p == pack_name)
            && !self.disabled_packs.iter().any(|p| p == pack_name)
    }

    pub fn mode_for(&self, severity: Severity) -> Mode {
        self.severity_modes.get(&severity).copied().unwrap_or_else(|| severity.default_mode())
    }
}

/// A config update's history entry — full snapshot plus a human-readable
/// diff summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigHistoryEntry {
    pub id: String,
    pub snapshot: DcgConfig,
    pub diff_summary: String,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub command: String,
    pub pack: String,
    pub rule_id: String,
    pub pattern: String,
    pub severity: Severity,
    pub reason: String,
    pub context_classification: ContextClassification,
    pub false_positive: bool,
    pub allowlisted: bool,
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub agent_id: String,
    pub command: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionStatus {
    Pending,
    Approved,
    Denied,
    Expired,
    Executed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowOnceException {
    pub code: String,
    pub command: String,
    pub command_hash: String,
    pub rule_ids: Vec<String>,
    pub status: ExceptionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trend {
    pub current: u64,
    pub previous: u64,
    pub percent_change: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketCount {
    pub day: chrono::NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DcgStats {
    pub total_blocks: u64,
    pub blocks_last_24h: u64,
    pub blocks_last_7d: u64,
    pub blocks_last_30d: u64,
    pub false_positive_count: u64,
    pub false_positive_rate: f64,
    pub allowlist_size: usize,
    pub pending_exceptions_count: u64,
    pub trend_24h: Trend,
    pub trend_7d: Trend,
    pub trend_30d: Trend,
    pub top_patterns: Vec<NamedCount>,
    pub top_agents: Vec<NamedCount>,
    pub series_7d: Vec<BucketCount>,
    pub series_30d: Vec<BucketCount>,
}
