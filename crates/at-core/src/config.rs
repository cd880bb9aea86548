use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.auto-tundra/config.toml`, with
/// env vars overriding individual fields at daemon startup (SPEC_FULL.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub caam: CaamConfig,
    #[serde(default)]
    pub git_sync: GitSyncConfig,
    #[serde(default)]
    pub dcg: DcgConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            db: DbConfig::default(),
            caam: CaamConfig::default(),
            git_sync: GitSyncConfig::default(),
            dcg: DcgConfig::default(),
            hub: HubConfig::default(),
            security: SecurityConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `~/.auto-tundra/config.toml`, falling back to
    /// defaults when the file does not exist, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load from a specific path, applying env overrides as `load` does.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let mut cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DB_FILE_NAME") {
            self.db.file_name = v;
        }
        if let Ok(v) = std::env::var("DB_AUTO_MIGRATE") {
            self.db.auto_migrate = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("DB_SLOW_QUERY_MS") {
            if let Ok(ms) = v.parse() {
                self.db.slow_query_ms = ms;
            }
        }
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".auto-tundra")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_project_name")]
    pub project_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub workspace_root: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            log_level: default_log_level(),
            workspace_root: None,
        }
    }
}

fn default_project_name() -> String {
    "auto-tundra".into()
}
fn default_log_level() -> String {
    "info".into()
}

/// SQLite connection settings shared by `at-eventlog`, `at-caam`,
/// `at-gitsync`, `at-dcg` and `at-audit` (SPEC_FULL.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_db_file_name")]
    pub file_name: String,
    #[serde(default = "default_auto_migrate")]
    pub auto_migrate: bool,
    #[serde(default = "default_slow_query_ms")]
    pub slow_query_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            file_name: default_db_file_name(),
            auto_migrate: default_auto_migrate(),
            slow_query_ms: default_slow_query_ms(),
        }
    }
}

fn default_db_file_name() -> String {
    "auto-tundra.db".into()
}
fn default_auto_migrate() -> bool {
    true
}
fn default_slow_query_ms() -> u64 {
    100
}

/// Credential-pool rotation settings (SPEC_FULL.md §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaamConfig {
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: HashMap<String, u32>,
    #[serde(default = "default_rotation_strategy")]
    pub default_strategy: String,
}

impl Default for CaamConfig {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            default_strategy: default_rotation_strategy(),
        }
    }
}

fn default_cooldown_minutes() -> HashMap<String, u32> {
    let mut m = HashMap::new();
    m.insert("claude".to_string(), 60);
    m.insert("codex".to_string(), 30);
    m.insert("gemini".to_string(), 15);
    m
}
fn default_rotation_strategy() -> String {
    "smart".into()
}

/// Git-sync scheduler tuning (SPEC_FULL.md §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSyncConfig {
    #[serde(default = "default_max_concurrent_ops")]
    pub max_concurrent_ops: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GitSyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ops: default_max_concurrent_ops(),
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_concurrent_ops() -> usize {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    5
}

/// Destructive-command guard defaults (SPEC_FULL.md §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcgConfig {
    #[serde(default = "default_allow_once_ttl_secs")]
    pub allow_once_ttl_secs: u64,
    #[serde(default)]
    pub disabled_packs: Vec<String>,
}

impl Default for DcgConfig {
    fn default() -> Self {
        Self {
            allow_once_ttl_secs: default_allow_once_ttl_secs(),
            disabled_packs: Vec::new(),
        }
    }
}

fn default_allow_once_ttl_secs() -> u64 {
    300
}

/// Pub/sub hub backpressure settings (SPEC_FULL.md §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: default_subscriber_queue_capacity(),
        }
    }
}

fn default_subscriber_queue_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub allow_shell_exec: bool,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_shell_exec: false,
            sandbox: true,
            allowed_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_port")]
    pub port: u16,
    #[serde(default = "default_daemon_host")]
    pub host: String,
    #[serde(default)]
    pub tls: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_daemon_port(),
            host: default_daemon_host(),
            tls: false,
        }
    }
}

fn default_daemon_port() -> u16 {
    9876
}
fn default_daemon_host() -> String {
    "127.0.0.1".into()
}
