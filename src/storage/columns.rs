//! Column-oriented checkpoint blob
//!
//! The blob mirrors the progress log as parallel sequences, one per column. It
//! is rewritten on every flush and read back on restart to replay the last
//! flushed buffer into the progress log.

use crate::state::{ArtifactFlags, Outcome, WorkItem};
use crate::storage::{write_atomic, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parallel columns of a checkpoint buffer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointColumns {
    pub report: Vec<bool>,
    pub tearsheet: Vec<bool>,
    #[serde(rename = "industry-report")]
    pub industry_report: Vec<bool>,
    #[serde(rename = "data-record-id")]
    pub data_record_id: Vec<u64>,
    pub name: Vec<String>,
    /// Absent in blobs written before outcomes were tracked
    #[serde(default)]
    pub outcome: Vec<Outcome>,
}

impl CheckpointColumns {
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut columns = Self::default();
        for item in items {
            columns.report.push(item.artifacts.report);
            columns.tearsheet.push(item.artifacts.tearsheet);
            columns.industry_report.push(item.artifacts.industry_report);
            columns.data_record_id.push(item.index);
            columns.name.push(item.note.clone());
            columns.outcome.push(item.outcome);
        }
        columns
    }

    /// Number of rows for which every column has an entry
    pub fn aligned_len(&self) -> usize {
        let mut len = [
            self.report.len(),
            self.tearsheet.len(),
            self.industry_report.len(),
            self.data_record_id.len(),
            self.name.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0);

        if !self.outcome.is_empty() {
            len = len.min(self.outcome.len());
        }
        len
    }

    /// Length of the longest column
    pub fn max_len(&self) -> usize {
        [
            self.report.len(),
            self.tearsheet.len(),
            self.industry_report.len(),
            self.data_record_id.len(),
            self.name.len(),
            self.outcome.len(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.aligned_len() == 0
    }

    /// Highest index among the aligned rows
    pub fn max_index(&self) -> Option<u64> {
        self.data_record_id[..self.aligned_len()].iter().copied().max()
    }

    /// Rebuilds work items from the aligned prefix of every column
    ///
    /// Returns the items and the number of trailing entries that were dropped.
    pub fn to_items(&self) -> (Vec<WorkItem>, usize) {
        let len = self.aligned_len();
        let dropped = self.max_len() - len;
        if dropped > 0 {
            tracing::warn!(
                "Checkpoint columns misaligned (longest {}, shortest {}); dropping {} trailing entries",
                self.max_len(),
                len,
                dropped
            );
        }

        let items = (0..len)
            .map(|i| {
                let artifacts = ArtifactFlags {
                    report: self.report[i],
                    tearsheet: self.tearsheet[i],
                    industry_report: self.industry_report[i],
                };
                let note = self.name[i].clone();
                let outcome = self
                    .outcome
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| Outcome::infer(artifacts.report, &note));
                WorkItem {
                    index: self.data_record_id[i],
                    outcome,
                    note,
                    artifacts,
                }
            })
            .collect();

        (items, dropped)
    }

    /// Reads a blob, returning `None` when the file does not exist
    pub fn load(path: &Path) -> StorageResult<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomically replaces the blob at `path`
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        write_atomic(path, |file| {
            serde_json::to_writer(&mut *file, self)?;
            Ok(())
        })
    }
}
