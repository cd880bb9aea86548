//! Destructive-command guard: pack/rule evaluation, severity-mode
//! resolution, block-event ingestion, allow-once exceptions, and
//! statistics (SPEC_FULL.md §4.F).

mod error;
mod evaluate;
mod exceptions;
mod packs;
mod stats;
mod types;

pub use error::DcgError;
pub use evaluate::evaluate;
pub use packs::builtin_packs;
pub use types::{
    AllowOnceException, AllowlistEntry, BlockEvent, ContextClassification, DcgConfig, DcgStats, EvaluationResult,
    ExceptionStatus, IngestRequest, Match, Mode, Pack, Pattern, Rule, Severity, Verdict,
};

use std::collections::VecDeque;
use std::sync::Arc;

use at_core::db::{Migration, SqliteDb};
use at_core::types::AuthContext;
use at_hub::Hub;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

const DEFAULT_RING_CAPACITY: usize = 100;

static MIGRATIONS: &[Migration] = &[Migration {
    name: "0001_create_dcg_tables",
    sql: "
        CREATE TABLE block_events (
            id TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            agent_id TEXT NOT NULL,
            command TEXT NOT NULL,
            pack TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            pattern TEXT NOT NULL,
            severity TEXT NOT NULL,
            reason TEXT NOT NULL,
            context_classification TEXT NOT NULL,
            false_positive INTEGER NOT NULL DEFAULT 0,
            allowlisted INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX idx_block_events_timestamp ON block_events(timestamp);

        CREATE TABLE config_history (
            id TEXT PRIMARY KEY,
            snapshot TEXT NOT NULL,
            diff_summary TEXT NOT NULL,
            updated_by TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE exceptions (
            code TEXT PRIMARY KEY,
            command TEXT NOT NULL,
            command_hash TEXT NOT NULL,
            rule_ids TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            decided_by TEXT
        );
    ",
}];

pub struct Dcg {
    db: SqliteDb,
    hub: Option<Arc<Hub>>,
    packs: Vec<Pack>,
    config: RwLock<DcgConfig>,
    recent: Mutex<VecDeque<BlockEvent>>,
    ring_capacity: usize,
}

impl Dcg {
    pub async fn open(path: impl AsRef<std::path::Path>, slow_query_ms: u64, hub: Option<Arc<Hub>>) -> Result<Self, DcgError> {
        let db = SqliteDb::open(path, slow_query_ms, MIGRATIONS).await?;
        Ok(Self::from_db(db, hub))
    }

    pub async fn open_in_memory(hub: Option<Arc<Hub>>) -> Result<Self, DcgError> {
        let db = SqliteDb::open_in_memory(MIGRATIONS).await?;
        Ok(Self::from_db(db, hub))
    }

    fn from_db(db: SqliteDb, hub: Option<Arc<Hub>>) -> Self {
        Self {
            db,
            hub,
            packs: builtin_packs(),
            config: RwLock::new(DcgConfig::default()),
            recent: Mutex::new(VecDeque::new()),
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }

    pub async fn get_config(&self) -> DcgConfig {
        self.config.read().await.clone()
    }

    pub fn list_pack_names(&self) -> Vec<String> {
        self.packs.iter().map(|p| p.name.clone()).collect()
    }

    /// Enable/disable packs or change severity modes, recording a
    /// history entry and publishing `dcg.config_updated`.
    #[instrument(skip(self, mutate))]
    pub async fn update_config<F>(&self, updated_by: &str, diff_summary: &str, mutate: F) -> Result<DcgConfig, DcgError>
    where
        F: FnOnce(&mut DcgConfig),
    {
        let snapshot = {
            let mut guard = self.config.write().await;
            mutate(&mut guard);
            guard.updated_by = updated_by.to_string();
            guard.updated_at = Utc::now();
            guard.clone()
        };

        let id = at_core::ids::new_id("cfh");
        let snapshot_json = serde_json::to_string(&snapshot).unwrap_or_default();
        let diff_summary = diff_summary.to_string();
        let updated_by_owned = updated_by.to_string();
        self.db
            .call("insert config history", move |c| {
                c.execute(
                    "INSERT INTO config_history (id, snapshot, diff_summary, updated_by, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![id, snapshot_json, diff_summary, updated_by_owned, Utc::now().to_rfc3339()],
                )
            })
            .await?;

        if let Some(hub) = &self.hub {
            let _ = hub
                .publish(
                    &AuthContext::admin(),
                    at_core::types::Channel::SystemDcg,
                    "dcg.config_updated",
                    serde_json::to_value(&snapshot).unwrap_or_default(),
                    None,
                )
                .await;
        }

        Ok(snapshot)
    }

    /// Evaluate `command` and, if any rule fires, persist and publish a
    /// block event. Returns the verdict the caller must act on (`Deny`
    /// refuses dispatch; `Warn`/`Log`/`Allow` permit it).
    #[instrument(skip(self, command), fields(agent_id = %agent_id))]
    pub async fn evaluate_and_record(&self, agent_id: &str, command: &str) -> Result<(Verdict, Option<BlockEvent>), DcgError> {
        let config = self.get_config().await;
        let now = Utc::now();
        let (result, all_matches) = evaluate(&self.packs, &config, command, now);

        // An active (non-suppressed) match drives both the verdict and
        // the record. If every match was allowlist-suppressed, the
        // highest-severity one is still recorded for audit purposes,
        // with `allowlisted` set and the command allowed to proceed.
        let (m, allowlisted) = match result.winning_match.clone() {
            Some(m) => (Some(m), false),
            None => {
                let mut highest: Option<Match> = None;
                for candidate in all_matches {
                    if highest.as_ref().map(|best| candidate.severity > best.severity).unwrap_or(true) {
                        highest = Some(candidate);
                    }
                }
                (highest, true)
            }
        };

        let Some(m) = m else {
            return Ok((Verdict::Allow, None));
        };

        let event = self.ingest(agent_id, command, &m, allowlisted).await?;
        Ok((result.verdict, Some(event)))
    }

    async fn ingest(&self, agent_id: &str, command: &str, m: &Match, allowlisted: bool) -> Result<BlockEvent, DcgError> {
        let id = at_core::ids::new_id("blk");
        let event = BlockEvent {
            id: id.clone(),
            timestamp: Utc::now(),
            agent_id: agent_id.to_string(),
            command: at_core::redact::redact(command),
            pack: m.pack.clone(),
            rule_id: m.rule_id.clone(),
            pattern: m.pattern_text.clone(),
            severity: m.severity,
            reason: m.reason.clone(),
            context_classification: m.context_classification,
            false_positive: false,
            allowlisted,
        };

        self.persist_event(&event).await?;

        {
            let mut ring = self.recent.lock().await;
            ring.push_back(event.clone());
            while ring.len() > self.ring_capacity {
                ring.pop_front();
            }
        }

        if let Some(hub) = &self.hub {
            let message_type = match event.severity {
                Severity::Critical | Severity::High => "dcg.block",
                Severity::Medium | Severity::Low => "dcg.warn",
            };
            let _ = hub
                .publish(
                    &AuthContext::admin(),
                    at_core::types::Channel::SystemDcg,
                    message_type,
                    serde_json::to_value(&event).unwrap_or_default(),
                    None,
                )
                .await;
        }

        Ok(event)
    }

    async fn persist_event(&self, event: &BlockEvent) -> Result<(), DcgError> {
        let event = event.clone();
        self.db
            .call("insert block event", move |c| {
                c.execute(
                    "INSERT INTO block_events (id, timestamp, agent_id, command, pack, rule_id, pattern, severity, reason, context_classification, false_positive, allowlisted)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    rusqlite::params![
                        event.id,
                        event.timestamp.to_rfc3339(),
                        event.agent_id,
                        event.command,
                        event.pack,
                        event.rule_id,
                        event.pattern,
                        serde_json::to_value(event.severity).unwrap_or_default().as_str().unwrap_or("").to_string(),
                        event.reason,
                        serde_json::to_value(event.context_classification).unwrap_or_default().as_str().unwrap_or("").to_string(),
                        event.false_positive as i64,
                        event.allowlisted as i64,
                    ],
                )
            })
            .await?;
        Ok(())
    }

    /// Idempotently mark a block event as a false positive. Returns
    /// `None` if the id is unknown.
    #[instrument(skip(self))]
    pub async fn mark_false_positive(&self, id: &str, _actor: &str) -> Result<Option<BlockEvent>, DcgError> {
        let id_owned = id.to_string();
        let updated = self
            .db
            .call("mark false positive", move |c| {
                c.execute(
                    "UPDATE block_events SET false_positive = 1 WHERE id = ?1",
                    rusqlite::params![id_owned],
                )
            })
            .await?;
        if updated == 0 {
            return Ok(None);
        }

        let event = self.get_event(id).await?;
        if let (Some(event), Some(hub)) = (&event, &self.hub) {
            let _ = hub
                .publish(
                    &AuthContext::admin(),
                    at_core::types::Channel::SystemDcg,
                    "dcg.false_positive",
                    serde_json::to_value(event).unwrap_or_default(),
                    None,
                )
                .await;
        }
        Ok(event)
    }

    pub async fn get_event(&self, id: &str) -> Result<Option<BlockEvent>, DcgError> {
        let id = id.to_string();
        let row = self
            .db
            .call("get block event", move |c| {
                c.query_row(
                    "SELECT id, timestamp, agent_id, command, pack, rule_id, pattern, severity, reason, context_classification, false_positive, allowlisted
                     FROM block_events WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_event,
                )
                .optional()
            })
            .await?;
        Ok(row)
    }

    /// Events ordered newest-first, bounded by `limit`.
    pub async fn list_events(&self, limit: usize) -> Result<Vec<BlockEvent>, DcgError> {
        let rows = self
            .db
            .call("list block events", move |c| {
                let mut stmt = c.prepare(
                    "SELECT id, timestamp, agent_id, command, pack, rule_id, pattern, severity, reason, context_classification, false_positive, allowlisted
                     FROM block_events ORDER BY timestamp DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit as i64], row_to_event)?.collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn create_exception(&self, command: &str, rule_ids: Vec<String>) -> Result<AllowOnceException, DcgError> {
        let ttl_secs = 300;
        let exc = exceptions::new_exception(command, rule_ids, ttl_secs, Utc::now());
        self.persist_exception(&exc).await?;
        Ok(exc)
    }

    async fn persist_exception(&self, exc: &AllowOnceException) -> Result<(), DcgError> {
        let exc = exc.clone();
        self.db
            .call("insert exception", move |c| {
                c.execute(
                    "INSERT INTO exceptions (code, command, command_hash, rule_ids, status, created_at, expires_at, decided_by)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        exc.code,
                        exc.command,
                        exc.command_hash,
                        serde_json::to_string(&exc.rule_ids).unwrap_or_default(),
                        serde_json::to_value(exc.status).unwrap_or_default().as_str().unwrap_or("").to_string(),
                        exc.created_at.to_rfc3339(),
                        exc.expires_at.to_rfc3339(),
                        exc.decided_by,
                    ],
                )
            })
            .await?;
        Ok(())
    }

    pub async fn get_exception(&self, code: &str) -> Result<Option<AllowOnceException>, DcgError> {
        let code = code.to_string();
        let row = self
            .db
            .call("get exception", move |c| {
                c.query_row(
                    "SELECT code, command, command_hash, rule_ids, status, created_at, expires_at, decided_by FROM exceptions WHERE code = ?1",
                    rusqlite::params![code],
                    row_to_exception,
                )
                .optional()
            })
            .await?;
        Ok(row)
    }

    /// Operator approval — requires an authenticated actor, never the
    /// requesting agent.
    #[instrument(skip(self))]
    pub async fn approve_exception(&self, code: &str, actor: &str) -> Result<AllowOnceException, DcgError> {
        self.decide_exception(code, actor, ExceptionStatus::Approved).await
    }

    #[instrument(skip(self))]
    pub async fn deny_exception(&self, code: &str, actor: &str) -> Result<AllowOnceException, DcgError> {
        self.decide_exception(code, actor, ExceptionStatus::Denied).await
    }

    async fn decide_exception(&self, code: &str, actor: &str, status: ExceptionStatus) -> Result<AllowOnceException, DcgError> {
        let mut exc = self
            .get_exception(code)
            .await?
            .ok_or_else(|| DcgError::ExceptionNotFound(code.to_string()))?;
        if exc.status != ExceptionStatus::Pending {
            return Err(DcgError::ExceptionNotPending(code.to_string()));
        }
        if exc.expires_at <= Utc::now() {
            return Err(DcgError::ExceptionExpired(code.to_string()));
        }
        exc.status = status;
        exc.decided_by = Some(actor.to_string());
        self.update_exception_status(&exc).await?;
        Ok(exc)
    }

    /// Consume an approved exception for the exact command (verified by
    /// hash). Single use: transitions to `Executed` on success.
    #[instrument(skip(self, command))]
    pub async fn consume_exception(&self, code: &str, command: &str) -> Result<(), DcgError> {
        let mut exc = self
            .get_exception(code)
            .await?
            .ok_or_else(|| DcgError::ExceptionNotFound(code.to_string()))?;
        if exc.status != ExceptionStatus::Approved {
            return Err(DcgError::ExceptionNotPending(code.to_string()));
        }
        if exc.expires_at <= Utc::now() {
            return Err(DcgError::ExceptionExpired(code.to_string()));
        }
        if exceptions::hash_command(command) != exc.command_hash {
            return Err(DcgError::ExceptionHashMismatch(code.to_string()));
        }
        exc.status = ExceptionStatus::Executed;
        self.update_exception_status(&exc).await?;
        Ok(())
    }

    async fn update_exception_status(&self, exc: &AllowOnceException) -> Result<(), DcgError> {
        let code = exc.code.clone();
        let status = serde_json::to_value(exc.status).unwrap_or_default().as_str().unwrap_or("").to_string();
        let decided_by = exc.decided_by.clone();
        self.db
            .call("update exception status", move |c| {
                c.execute(
                    "UPDATE exceptions SET status = ?1, decided_by = ?2 WHERE code = ?3",
                    rusqlite::params![status, decided_by, code],
                )
            })
            .await?;
        Ok(())
    }

    pub async fn pending_exceptions_count(&self) -> Result<u64, DcgError> {
        let count: i64 = self
            .db
            .call("count pending exceptions", |c| {
                c.query_row(
                    "SELECT COUNT(*) FROM exceptions WHERE status = 'pending'",
                    [],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count as u64)
    }

    /// Statistics snapshot. Storage failures degrade to zeros rather
    /// than propagating (SPEC_FULL.md §4.F "Statistics").
    #[instrument(skip(self))]
    pub async fn get_stats(&self, now: chrono::DateTime<Utc>) -> DcgStats {
        let rows = self.fetch_stats_rows().await.unwrap_or_default();
        let allowlist_size = self.get_config().await.allowlist.len();
        let pending = self.pending_exceptions_count().await.unwrap_or(0);
        stats::compute(&rows, allowlist_size, pending, now)
    }

    async fn fetch_stats_rows(&self) -> Result<Vec<stats::StatsRow>, DcgError> {
        let rows = self
            .db
            .call("fetch stats rows", |c| {
                let mut stmt = c.prepare("SELECT timestamp, pattern, agent_id, false_positive FROM block_events")?;
                let rows = stmt
                    .query_map([], |row| {
                        let timestamp: String = row.get(0)?;
                        let pattern: String = row.get(1)?;
                        let agent_id: String = row.get(2)?;
                        let false_positive: i64 = row.get(3)?;
                        Ok((timestamp, pattern, agent_id, false_positive))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|(timestamp, pattern, agent_id, false_positive)| stats::StatsRow {
                timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                pattern,
                agent_id,
                false_positive: false_positive != 0,
            })
            .collect())
    }
}

use rusqlite::OptionalExtension;

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<BlockEvent> {
    let timestamp: String = row.get(1)?;
    let severity: String = row.get(7)?;
    let context_classification: String = row.get(9)?;
    Ok(BlockEvent {
        id: row.get(0)?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        agent_id: row.get(2)?,
        command: row.get(3)?,
        pack: row.get(4)?,
        rule_id: row.get(5)?,
        pattern: row.get(6)?,
        severity: serde_json::from_value(serde_json::Value::String(severity)).unwrap_or(Severity::Low),
        reason: row.get(8)?,
        context_classification: serde_json::from_value(serde_json::Value::String(context_classification)).unwrap_or(ContextClassification::Ambiguous),
        false_positive: row.get::<_, i64>(10)? != 0,
        allowlisted: row.get::<_, i64>(11)? != 0,
    })
}

fn row_to_exception(row: &rusqlite::Row) -> rusqlite::Result<AllowOnceException> {
    let rule_ids: String = row.get(3)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let expires_at: String = row.get(6)?;
    Ok(AllowOnceException {
        code: row.get(0)?,
        command: row.get(1)?,
        command_hash: row.get(2)?,
        rule_ids: serde_json::from_str(&rule_ids).unwrap_or_default(),
        status: serde_json::from_value(serde_json::Value::String(status)).unwrap_or(ExceptionStatus::Expired),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        expires_at: chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        decided_by: row.get(7)?,
    })
}
