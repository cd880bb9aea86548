//! The `Runtime` value (SPEC_FULL.md §9 "Global mutable state"): owns
//! every process-wide singleton and is threaded through route handlers
//! via `axum::State`, so tests can build an isolated instance per case
//! instead of reaching for a global.

use std::sync::Arc;

use at_audit::AuditSink;
use at_caam::Caam;
use at_cliwrap::{CommandExecutor, LocalProcessExecutor};
use at_core::config::Config;
use at_core::error::CoreError;
use at_dcg::Dcg;
use at_eventlog::EventLog;
use at_gitsync::GitSync;
use at_hub::{Hub, HubConfig};

pub struct Runtime {
    pub event_log: Arc<EventLog>,
    pub hub: Arc<Hub>,
    pub caam: Arc<Caam>,
    pub gitsync: Arc<GitSync>,
    pub dcg: Arc<Dcg>,
    pub audit: Arc<AuditSink>,
}

impl Runtime {
    /// Build every service against the database at `config.db.file_name`,
    /// applying migrations if `config.db.auto_migrate` is set.
    pub async fn open(config: &Config) -> Result<Self, CoreError> {
        let event_log = Arc::new(
            EventLog::open(&config.db.file_name, config.db.slow_query_ms)
                .await
                .map_err(|e| CoreError::internal(e.to_string()))?
                .with_retention(AuditSink::retention()),
        );
        let hub = Arc::new(Hub::new(event_log.clone(), HubConfig::from(config.hub.clone()), None));
        let caam = Arc::new(Caam::new(config.caam.clone()));
        let executor: Arc<dyn CommandExecutor> = Arc::new(LocalProcessExecutor);
        let gitsync = Arc::new(GitSync::new(config.git_sync.clone(), executor));
        let dcg = Arc::new(
            Dcg::open(&config.db.file_name, config.db.slow_query_ms, Some(hub.clone()))
                .await
                .map_err(|e| CoreError::internal(e.to_string()))?,
        );
        let audit = Arc::new(AuditSink::new(event_log.clone()));

        Ok(Self { event_log, hub, caam, gitsync, dcg, audit })
    }

    /// In-memory runtime for tests and demos: no files touched, nothing
    /// persists past the process.
    pub async fn open_in_memory() -> Result<Self, CoreError> {
        let event_log = Arc::new(
            EventLog::open_in_memory()
                .await
                .map_err(|e| CoreError::internal(e.to_string()))?
                .with_retention(AuditSink::retention()),
        );
        let hub = Arc::new(Hub::new(event_log.clone(), HubConfig::default(), None));
        let caam = Arc::new(Caam::new(at_core::config::CaamConfig::default()));
        let executor: Arc<dyn CommandExecutor> = Arc::new(at_cliwrap::MockExecutor::default());
        let gitsync = Arc::new(GitSync::new(at_core::config::GitSyncConfig::default(), executor));
        let dcg = Arc::new(
            Dcg::open_in_memory(Some(hub.clone()))
                .await
                .map_err(|e| CoreError::internal(e.to_string()))?,
        );
        let audit = Arc::new(AuditSink::new(event_log.clone()));

        Ok(Self { event_log, hub, caam, gitsync, dcg, audit })
    }
}
