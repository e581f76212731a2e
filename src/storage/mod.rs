//! Storage module for persisting crawl progress
//!
//! This module handles everything that survives a process restart:
//! - The CSV progress log (one row per finished record)
//! - The JSON checkpoint blob (the last flushed buffer, column by column)
//! - The SQLite run ledger (one row per supervised attempt)

mod columns;
mod csv_store;
mod ledger;
mod schema;
mod traits;

pub use columns::CheckpointColumns;
pub use csv_store::CsvProgressStore;
pub use ledger::{AttemptRecord, AttemptStatus, RunLedger};
pub use traits::{ProgressStore, StorageError, StorageResult};

use crate::state::WorkItem;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;

/// Row order used when the progress log is rewritten
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeOrder {
    /// Newly flushed records first, then the previous contents
    #[default]
    BufferFirst,

    /// All records sorted by index
    Chronological,
}

/// Summary of one `append_merge`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records taken from the buffer
    pub merged: usize,

    /// Trailing buffer entries dropped because their columns were misaligned
    pub truncated: usize,

    /// Existing records superseded by a buffer record with the same index
    pub replaced: usize,

    /// Records in the store after the merge
    pub total: usize,

    pub previous_max: Option<u64>,
    pub new_max: Option<u64>,
}

/// Combines a buffer with the existing store contents
///
/// Buffer records come first. Only the first record seen for an index is kept,
/// so a buffer entry supersedes an existing entry with the same index.
pub(crate) fn merge_records(
    buffer: Vec<WorkItem>,
    existing: Vec<WorkItem>,
    order: MergeOrder,
) -> (Vec<WorkItem>, usize) {
    let buffer_indices: HashSet<u64> = buffer.iter().map(|item| item.index).collect();
    let replaced = existing
        .iter()
        .filter(|item| buffer_indices.contains(&item.index))
        .count();

    let mut merged = dedupe_by_index(buffer.into_iter().chain(existing));

    if order == MergeOrder::Chronological {
        merged.sort_by_key(|item| item.index);
    }

    (merged, replaced)
}

/// Keeps the first record for each index, preserving order
pub(crate) fn dedupe_by_index(items: impl IntoIterator<Item = WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.index))
        .collect()
}

/// Replaces `path` with whatever `write` produces, never exposing a partial file
///
/// Writes into a temporary file in the same directory, syncs it, then renames it
/// over the destination.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> StorageResult<()>
where
    F: FnOnce(&mut File) -> StorageResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
