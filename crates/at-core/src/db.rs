//! Shared SQLite connection helper: WAL pragmas, a numbered-migration
//! runner, and slow-query logging, used by every persistence-backed
//! subsystem (`at-eventlog`, `at-caam`, `at-gitsync`, `at-dcg`, `at-audit`).

use std::path::Path;
use std::time::Instant;

use rusqlite::Connection as RusqliteConnection;
use tokio_rusqlite::Connection;
use tracing::warn;

use crate::error::CoreError;

/// A single forward-only migration: a name for the `__migrations` ledger
/// and the SQL to run when it hasn't been applied yet.
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Thin wrapper around a `tokio_rusqlite::Connection` configured for
/// concurrent access from an async runtime: WAL journaling, a busy
/// timeout instead of immediate `SQLITE_BUSY` errors, and a slow-query
/// threshold that logs instead of failing.
#[derive(Clone)]
pub struct SqliteDb {
    conn: Connection,
    slow_query_ms: u64,
}

impl SqliteDb {
    /// Open (creating if absent) the database at `path`, apply pragmas,
    /// and run any migrations not yet recorded in `__migrations`.
    pub async fn open(
        path: impl AsRef<Path>,
        slow_query_ms: u64,
        migrations: &'static [Migration],
    ) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).await?;
        conn.call(|c| {
            c.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await?;
        let db = Self { conn, slow_query_ms };
        db.run_migrations(migrations).await?;
        Ok(db)
    }

    /// Open an in-memory database for tests — no file, no WAL (WAL
    /// requires a shared backing file), migrations still applied.
    pub async fn open_in_memory(migrations: &'static [Migration]) -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().await?;
        let db = Self {
            conn,
            slow_query_ms: u64::MAX,
        };
        db.run_migrations(migrations).await?;
        Ok(db)
    }

    async fn run_migrations(&self, migrations: &'static [Migration]) -> Result<(), CoreError> {
        self.conn
            .call(|c| {
                c.execute_batch(
                    "CREATE TABLE IF NOT EXISTS __migrations (
                        name TEXT PRIMARY KEY,
                        applied_at TEXT NOT NULL DEFAULT (datetime('now'))
                    );",
                )?;
                Ok(())
            })
            .await?;

        for m in migrations {
            let already_applied = self
                .conn
                .call(move |c| {
                    let applied: bool = c.query_row(
                        "SELECT EXISTS(SELECT 1 FROM __migrations WHERE name = ?1)",
                        [m.name],
                        |row| row.get(0),
                    )?;
                    Ok(applied)
                })
                .await?;
            if already_applied {
                continue;
            }
            self.conn
                .call(move |c: &mut RusqliteConnection| {
                    let tx = c.transaction()?;
                    tx.execute_batch(m.sql)?;
                    tx.execute("INSERT INTO __migrations (name) VALUES (?1)", [m.name])?;
                    tx.commit()?;
                    Ok(())
                })
                .await?;
        }
        Ok(())
    }

    /// Run a blocking closure against the connection, logging a warning
    /// if it takes longer than the configured slow-query threshold.
    pub async fn call<F, T>(&self, label: &'static str, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut RusqliteConnection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let start = Instant::now();
        let result = self.conn.call(move |c| Ok(f(c)?)).await;
        let elapsed = start.elapsed();
        if elapsed.as_millis() as u64 > self.slow_query_ms {
            warn!(query = label, elapsed_ms = elapsed.as_millis() as u64, "slow query");
        }
        result.map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static MIGRATIONS: &[Migration] = &[Migration {
        name: "0001_create_widgets",
        sql: "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    }];

    #[tokio::test]
    async fn opens_in_memory_and_applies_migrations() {
        let db = SqliteDb::open_in_memory(MIGRATIONS).await.unwrap();
        db.call("insert widget", |c| {
            c.execute("INSERT INTO widgets (name) VALUES ('a')", [])
        })
        .await
        .unwrap();
        let count: i64 = db
            .call("count widgets", |c| {
                c.query_row("SELECT COUNT(*) FROM widgets", [], |r| r.get(0))
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn migrations_are_idempotent_across_opens() {
        static M: &[Migration] = &[Migration {
            name: "0001_create_gadgets",
            sql: "CREATE TABLE gadgets (id INTEGER PRIMARY KEY);",
        }];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db1 = SqliteDb::open(&path, 100, M).await.unwrap();
        drop(db1);
        // Re-opening must not fail even though the migration already ran.
        let _db2 = SqliteDb::open(&path, 100, M).await.unwrap();
    }
}
