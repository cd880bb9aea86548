//! Durable, per-channel event log backed by SQLite (SPEC_FULL.md §4.B): the
//! shared backbone `at-hub`, `at-dcg` and `at-audit` append to and replay
//! from.

mod cursor;
mod error;
mod retention;

pub use error::EventLogError;
pub use retention::{RetentionPolicy, RetentionTable};

use at_core::db::{Migration, SqliteDb};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

static MIGRATIONS: &[Migration] = &[Migration {
    name: "0001_create_events",
    sql: "
        CREATE TABLE events (
            id TEXT PRIMARY KEY,
            channel TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            message_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            correlation_id TEXT,
            created_at TEXT NOT NULL,
            expires_at TEXT
        );
        CREATE UNIQUE INDEX idx_events_channel_sequence ON events(channel, sequence);
        CREATE INDEX idx_events_expires_at ON events(expires_at);

        CREATE TABLE channel_sequences (
            channel TEXT PRIMARY KEY,
            next_sequence INTEGER NOT NULL
        );
    ",
}];

/// A durable event-log entry (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: String,
    pub channel: String,
    pub sequence: i64,
    pub cursor: String,
    pub message_type: String,
    pub payload: Value,
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct EventLog {
    db: SqliteDb,
    retention: RetentionTable,
}

impl EventLog {
    pub async fn open(path: impl AsRef<std::path::Path>, slow_query_ms: u64) -> Result<Self, EventLogError> {
        let db = SqliteDb::open(path, slow_query_ms, MIGRATIONS).await?;
        Ok(Self {
            db,
            retention: RetentionTable::default(),
        })
    }

    pub async fn open_in_memory() -> Result<Self, EventLogError> {
        let db = SqliteDb::open_in_memory(MIGRATIONS).await?;
        Ok(Self {
            db,
            retention: RetentionTable::default(),
        })
    }

    pub fn with_retention(mut self, retention: RetentionTable) -> Self {
        self.retention = retention;
        self
    }

    /// Append a new entry for `channel`, allocating the next per-channel
    /// sequence, then enforce both retention caps for that channel.
    #[instrument(skip(self, payload), fields(channel = %channel))]
    pub async fn append(
        &self,
        channel: &str,
        message_type: &str,
        payload: Value,
        correlation_id: Option<String>,
    ) -> Result<(String, i64), EventLogError> {
        let channel = channel.to_string();
        let message_type = message_type.to_string();
        let policy = self.retention.for_channel(&channel);
        let now = Utc::now();
        let expires_at = now + policy.max_age;
        let id = at_core::ids::new_id("evt");

        let channel_for_db = channel.clone();
        let sequence = self
            .db
            .call("append event", move |c| {
                let tx = c.transaction()?;
                tx.execute(
                    "INSERT INTO channel_sequences (channel, next_sequence) VALUES (?1, 1)
                     ON CONFLICT(channel) DO UPDATE SET next_sequence = next_sequence + 1",
                    rusqlite::params![channel_for_db],
                )?;
                let sequence: i64 = tx.query_row(
                    "SELECT next_sequence FROM channel_sequences WHERE channel = ?1",
                    rusqlite::params![channel_for_db],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO events (id, channel, sequence, message_type, payload, correlation_id, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        id,
                        channel_for_db,
                        sequence,
                        message_type,
                        payload.to_string(),
                        correlation_id,
                        now.to_rfc3339(),
                        expires_at.to_rfc3339(),
                    ],
                )?;
                // Enforce the count cap by deleting the oldest overflow rows.
                tx.execute(
                    "DELETE FROM events WHERE channel = ?1 AND sequence <= (
                        SELECT sequence FROM events WHERE channel = ?1
                        ORDER BY sequence DESC LIMIT 1 OFFSET ?2
                    )",
                    rusqlite::params![channel_for_db, policy.max_count as i64],
                )?;
                tx.commit()?;
                Ok(sequence)
            })
            .await?;

        Ok((cursor::encode(&channel, sequence), sequence))
    }

    /// Entries for `channel` strictly after `cursor` (or from the start if
    /// `cursor` is `None`), oldest first, bounded by `limit`.
    #[instrument(skip(self), fields(channel = %channel))]
    pub async fn range_after(
        &self,
        channel: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EventLogEntry>, EventLogError> {
        let after_sequence = match cursor {
            None => 0,
            Some(c) => {
                let (sequence, cursor_channel) = cursor::decode(c)
                    .ok_or_else(|| EventLogError::InvalidCursor(c.to_string()))?;
                if cursor_channel != channel {
                    return Err(EventLogError::InvalidCursor(c.to_string()));
                }
                sequence
            }
        };

        if let Some(c) = cursor {
            let oldest_retained = self.oldest_sequence(channel).await?;
            if let Some(oldest) = oldest_retained {
                let (requested, _) = cursor::decode(c).expect("validated above");
                if requested < oldest - 1 {
                    return Err(EventLogError::CursorExpired(c.to_string()));
                }
            }
        }

        let channel = channel.to_string();
        let rows = self
            .db
            .call("range_after", move |c| {
                let mut stmt = c.prepare(
                    "SELECT id, channel, sequence, message_type, payload, correlation_id, created_at, expires_at
                     FROM events WHERE channel = ?1 AND sequence > ?2 ORDER BY sequence ASC LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![channel, after_sequence, limit as i64], row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    pub async fn latest_cursor(&self, channel: &str) -> Result<Option<String>, EventLogError> {
        let channel_owned = channel.to_string();
        let sequence: Option<i64> = self
            .db
            .call("latest_cursor", move |c| {
                c.query_row(
                    "SELECT MAX(sequence) FROM events WHERE channel = ?1",
                    rusqlite::params![channel_owned],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(sequence.map(|s| cursor::encode(channel, s)))
    }

    async fn oldest_sequence(&self, channel: &str) -> Result<Option<i64>, EventLogError> {
        let channel = channel.to_string();
        let sequence: Option<i64> = self
            .db
            .call("oldest_sequence", move |c| {
                c.query_row(
                    "SELECT MIN(sequence) FROM events WHERE channel = ?1",
                    rusqlite::params![channel],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(sequence)
    }

    /// Delete all entries whose `expires_at` is at or before `now`.
    #[instrument(skip(self))]
    pub async fn expire(&self, now: DateTime<Utc>) -> Result<u64, EventLogError> {
        let deleted = self
            .db
            .call("expire", move |c| {
                c.execute(
                    "DELETE FROM events WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    rusqlite::params![now.to_rfc3339()],
                )
            })
            .await?;
        Ok(deleted as u64)
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<EventLogEntry> {
    let channel: String = row.get(1)?;
    let sequence: i64 = row.get(2)?;
    let payload_text: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let expires_at: Option<String> = row.get(7)?;
    Ok(EventLogEntry {
        id: row.get(0)?,
        cursor: cursor::encode(&channel, sequence),
        channel,
        sequence,
        message_type: row.get(3)?,
        payload: serde_json::from_str(&payload_text).unwrap_or(Value::Null),
        correlation_id: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        expires_at: expires_at.and_then(|e| {
            DateTime::parse_from_rfc3339(&e)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        }),
    })
}
