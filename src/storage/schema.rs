//! Run ledger schema
//!
//! This module contains the SQL schema for the run ledger database.

/// SQL schema for the run ledger
pub const SCHEMA_SQL: &str = r#"
-- One row per supervised attempt
CREATE TABLE IF NOT EXISTS attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    resume_index INTEGER NOT NULL,
    total INTEGER,
    processed INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error TEXT,
    config_hash TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attempts_status ON attempts(status);
"#;

/// Initializes the ledger schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
