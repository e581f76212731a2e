//! Storage traits and error types
//!
//! This module defines the trait interface for progress stores and
//! associated error types.

use crate::state::WorkItem;
use crate::storage::{CheckpointColumns, MergeReport};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Progress store already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Malformed progress log row {line}: {message}")]
    MalformedRow { line: u64, message: String },

    #[error("Attempt not found: {0}")]
    AttemptNotFound(i64),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record of finished work, keyed by record index
///
/// Records are only ever added: a merge may replace an entry with a fresher
/// copy of the same index but never drops an index that was persisted before.
pub trait ProgressStore {
    /// Creates an empty store
    ///
    /// Fails with `StorageError::AlreadyInitialized` if the store exists. The
    /// range size is informational; no upper bound is enforced.
    fn initialize(&mut self, range_size: Option<u64>) -> StorageResult<()>;

    /// Returns every persisted record in file order, or nothing if the store
    /// does not exist yet
    fn load(&self) -> StorageResult<Vec<WorkItem>>;

    /// Highest persisted index, or `None` for an empty store
    fn last_completed_index(&self) -> StorageResult<Option<u64>> {
        Ok(self.load()?.iter().map(|item| item.index).max())
    }

    /// Merges a checkpoint buffer into the store
    ///
    /// The buffer's columns are truncated to their shortest common length, the
    /// buffer's records are placed before the existing ones, and later copies of
    /// an index already seen are dropped. The store is replaced atomically.
    fn append_merge(&mut self, buffer: &CheckpointColumns) -> StorageResult<MergeReport>;

    /// Drops duplicate indices (first occurrence wins) and persists the result
    ///
    /// Returns the number of rows removed.
    fn reconcile(&mut self) -> StorageResult<usize>;
}
