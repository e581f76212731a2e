//! SQLite run ledger
//!
//! Every supervised attempt gets a row recording where it resumed, how far it
//! got and why it stopped.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use std::path::Path;

/// Status of a supervised attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptStatus {
    Running,
    Completed,
    Failed,
    /// Failed and the supervisor stopped retrying
    Abandoned,
}

impl AttemptStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// Represents one attempt in the ledger
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub resume_index: u64,
    pub total: Option<u64>,
    pub processed: u64,
    pub status: AttemptStatus,
    pub error: Option<String>,
    pub config_hash: String,
}

impl AttemptRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            resume_index: row.get::<_, i64>(3)? as u64,
            total: row.get::<_, Option<i64>>(4)?.map(|t| t as u64),
            processed: row.get::<_, i64>(5)? as u64,
            status: AttemptStatus::from_db_string(&row.get::<_, String>(6)?)
                .unwrap_or(AttemptStatus::Failed),
            error: row.get(7)?,
            config_hash: row.get(8)?,
        })
    }
}

const SELECT_ATTEMPT: &str = "SELECT id, started_at, finished_at, resume_index, total, processed,
     status, error, config_hash FROM attempts";

/// SQLite-backed attempt history
pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    /// Opens (or creates) the ledger at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates a ledger that lives only as long as the value
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Records the start of an attempt and returns its id
    pub fn begin_attempt(&mut self, resume_index: u64, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO attempts (started_at, resume_index, status, config_hash)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                now,
                resume_index as i64,
                AttemptStatus::Running.to_db_string(),
                config_hash
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Closes an attempt with its final status
    pub fn finish_attempt(
        &mut self,
        attempt_id: i64,
        status: AttemptStatus,
        total: Option<u64>,
        processed: u64,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE attempts SET status = ?1, finished_at = ?2, total = ?3, processed = ?4,
             error = ?5 WHERE id = ?6",
            params![
                status.to_db_string(),
                now,
                total.map(|t| t as i64),
                processed as i64,
                error,
                attempt_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::AttemptNotFound(attempt_id));
        }
        Ok(())
    }

    /// Marks a previously failed attempt as the one the supervisor gave up on
    pub fn abandon_attempt(&mut self, attempt_id: i64) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE attempts SET status = ?1 WHERE id = ?2",
            params![AttemptStatus::Abandoned.to_db_string(), attempt_id],
        )?;

        if updated == 0 {
            return Err(StorageError::AttemptNotFound(attempt_id));
        }
        Ok(())
    }

    pub fn get_attempt(&self, attempt_id: i64) -> StorageResult<AttemptRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE id = ?1", SELECT_ATTEMPT))?;

        stmt.query_row(params![attempt_id], AttemptRecord::from_row)
            .map_err(|_| StorageError::AttemptNotFound(attempt_id))
    }

    /// Most recent attempts, newest first
    pub fn recent_attempts(&self, limit: usize) -> StorageResult<Vec<AttemptRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY id DESC LIMIT ?1", SELECT_ATTEMPT))?;

        let attempts = stmt
            .query_map(params![limit as i64], AttemptRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    pub fn count_by_status(&self, status: AttemptStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM attempts WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
