//! SQLite-backed batch store
//!
//! Each batch is kept as its sanitized JSON payload plus one row per distinct
//! session it contains, so session queries do not decode every payload.

use crate::error::{Error, Result};
use crate::ingest::BatchStore;
use crate::types::{Batch, StoredBatch};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Durable [`BatchStore`] in a SQLite database file
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection()?;
        super::schema::run_migrations(&conn)
    }

    /// Number of stored batches
    pub fn count_batches(&self) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM batches", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("database connection lock poisoned".to_string()))
    }
}

/// Decode a `(payload, received_at)` row
fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn decode(payload: &str, received_at: &str) -> Result<StoredBatch> {
    let batch: Batch = serde_json::from_str(payload)?;
    let received_at = DateTime::parse_from_rfc3339(received_at)
        .map_err(|e| Error::Storage(format!("invalid received_at {:?}: {}", received_at, e)))?
        .with_timezone(&Utc);
    Ok(StoredBatch { batch, received_at })
}

fn collect_rows(rows: Vec<(String, String)>) -> Result<Vec<StoredBatch>> {
    rows.iter()
        .map(|(payload, received_at)| decode(payload, received_at))
        .collect()
}

impl BatchStore for SqliteStore {
    fn append(&self, stored: StoredBatch) -> Result<()> {
        let payload = serde_json::to_string(&stored.batch)?;
        let sessions: BTreeSet<&str> = stored
            .batch
            .events
            .iter()
            .map(|e| e.session_id.as_str())
            .collect();

        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO batches (received_at, event_count, payload) VALUES (?1, ?2, ?3)",
            params![
                stored.received_at.to_rfc3339(),
                stored.batch.events.len() as i64,
                payload
            ],
        )?;
        let batch_id = tx.last_insert_rowid();
        for session_id in sessions {
            tx.execute(
                "INSERT INTO batch_sessions (batch_id, session_id) VALUES (?1, ?2)",
                params![batch_id, session_id],
            )?;
        }
        tx.commit()?;

        tracing::debug!(batch_id, events = stored.batch.events.len(), "Stored batch");
        Ok(())
    }

    fn all_batches(&self) -> Result<Vec<StoredBatch>> {
        let rows = {
            let conn = self.connection()?;
            let mut stmt = conn.prepare("SELECT payload, received_at FROM batches ORDER BY id")?;
            let rows = stmt
                .query_map([], row_to_stored)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        collect_rows(rows)
    }

    fn batches_for_session(&self, session_id: &str) -> Result<Vec<StoredBatch>> {
        let rows = {
            let conn = self.connection()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT b.payload, b.received_at
                FROM batches b
                JOIN batch_sessions s ON s.batch_id = b.id
                WHERE s.session_id = ?1
                ORDER BY b.id
                "#,
            )?;
            let rows = stmt
                .query_map([session_id], row_to_stored)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        collect_rows(rows)
    }
}
