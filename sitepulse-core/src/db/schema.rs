//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: batches with their JSON payload
    r#"
    CREATE TABLE IF NOT EXISTS batches (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        received_at      DATETIME NOT NULL,
        event_count      INTEGER NOT NULL,

        -- Sanitized batch exactly as accepted
        payload          JSON NOT NULL
    );
    "#,
    // Version 2: session lookup without decoding every payload
    r#"
    CREATE TABLE IF NOT EXISTS batch_sessions (
        batch_id         INTEGER NOT NULL REFERENCES batches(id),
        session_id       TEXT NOT NULL,
        PRIMARY KEY (batch_id, session_id)
    );

    CREATE INDEX IF NOT EXISTS idx_batch_sessions_session ON batch_sessions(session_id);

    INSERT OR IGNORE INTO batch_sessions (batch_id, session_id)
    SELECT b.id, json_extract(e.value, '$.sessionId')
    FROM batches b, json_each(b.payload, '$.events') e
    WHERE json_extract(e.value, '$.sessionId') IS NOT NULL;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
