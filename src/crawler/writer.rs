//! Checkpoint writer
//!
//! Makes a checkpoint buffer durable: first as a JSON blob that mirrors the
//! buffer exactly, then merged into the progress log.

use crate::state::Checkpoint;
use crate::storage::{CheckpointColumns, MergeReport, ProgressStore, StorageResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub struct CheckpointWriter<P: ProgressStore> {
    store: P,
    blob_path: PathBuf,
}

impl<P: ProgressStore> CheckpointWriter<P> {
    pub fn new(store: P, blob_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            blob_path: blob_path.into(),
        }
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut P {
        &mut self.store
    }

    pub fn blob_path(&self) -> &Path {
        &self.blob_path
    }

    /// Persists the buffer and clears it
    ///
    /// The blob is written before the merge, so a crash between the two steps
    /// is repaired by `recover`. An empty buffer is left alone.
    pub fn flush(&mut self, checkpoint: &mut Checkpoint) -> StorageResult<Option<MergeReport>> {
        if checkpoint.is_empty() {
            return Ok(None);
        }

        let columns = CheckpointColumns::from_items(checkpoint.items());
        columns.save(&self.blob_path)?;
        let report = self.store.append_merge(&columns)?;
        checkpoint.clear();

        Ok(Some(report))
    }

    /// Replays the last flushed blob into the progress log if the log lacks
    /// any of its records
    pub fn recover(&mut self) -> StorageResult<Option<MergeReport>> {
        let Some(columns) = CheckpointColumns::load(&self.blob_path)? else {
            return Ok(None);
        };
        if columns.is_empty() {
            return Ok(None);
        }

        let persisted: HashSet<u64> = self.store.load()?.iter().map(|item| item.index).collect();
        let (items, _) = columns.to_items();
        let missing = items
            .iter()
            .filter(|item| !persisted.contains(&item.index))
            .count();

        if missing == 0 {
            tracing::debug!(
                "Checkpoint {} already reflected in progress log",
                self.blob_path.display()
            );
            return Ok(None);
        }

        tracing::info!(
            "Replaying {} records from checkpoint {} into progress log",
            missing,
            self.blob_path.display()
        );
        let report = self.store.append_merge(&columns)?;
        Ok(Some(report))
    }

    /// Makes sure the progress log reaches at least as far as the last blob
    ///
    /// A log that ends before the blob is repaired through `recover`.
    pub fn verify_resume_point(&mut self) -> StorageResult<Option<MergeReport>> {
        let blob_max = CheckpointColumns::load(&self.blob_path)?.and_then(|c| c.max_index());
        let store_max = self.store.last_completed_index()?;

        if let Some(blob_max) = blob_max {
            if store_max.map_or(true, |store_max| store_max < blob_max) {
                tracing::warn!(
                    "Progress log ends at id = {:?} but checkpoint reaches id = {}",
                    store_max,
                    blob_max
                );
            }
        }

        self.recover()
    }
}
