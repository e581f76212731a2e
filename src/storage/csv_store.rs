//! CSV progress log
//!
//! Layout: a leading row-number column with an empty header, then
//! `report`, `tearsheet`, `industry-report` (`Yes`/`No`), `data-record-id`,
//! `name` and `outcome`. The row-number column is ignored on load, as is any
//! other unknown column, so logs written by spreadsheet tooling load as well.

use crate::state::{ArtifactFlags, Outcome, WorkItem};
use crate::storage::traits::{ProgressStore, StorageError, StorageResult};
use crate::storage::{
    dedupe_by_index, merge_records, write_atomic, CheckpointColumns, MergeOrder, MergeReport,
};
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::path::{Path, PathBuf};

const HEADER: [&str; 7] = [
    "",
    "report",
    "tearsheet",
    "industry-report",
    "data-record-id",
    "name",
    "outcome",
];

/// One row of the progress log as found on disk
#[derive(Debug, Deserialize)]
struct LogRow {
    #[serde(deserialize_with = "yes_no")]
    report: bool,
    #[serde(deserialize_with = "yes_no")]
    tearsheet: bool,
    #[serde(rename = "industry-report", deserialize_with = "yes_no")]
    industry_report: bool,
    #[serde(rename = "data-record-id")]
    data_record_id: i64,
    name: String,
    #[serde(default)]
    outcome: Option<String>,
}

fn yes_no<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected Yes or No, got '{}'",
            other
        ))),
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

/// Progress store backed by a CSV file
pub struct CsvProgressStore {
    log_path: PathBuf,
    artifact_dir: Option<PathBuf>,
    merge_order: MergeOrder,
}

impl CsvProgressStore {
    pub fn new(log_path: impl Into<PathBuf>, merge_order: MergeOrder) -> Self {
        Self {
            log_path: log_path.into(),
            artifact_dir: None,
            merge_order,
        }
    }

    /// Also create `dir` when the store is initialized
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn exists(&self) -> bool {
        self.log_path.exists()
    }

    fn read_rows(&self) -> StorageResult<Vec<WorkItem>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.log_path)?;

        let mut items = Vec::new();
        for result in reader.deserialize::<LogRow>() {
            let row = result?;
            if row.data_record_id < 0 {
                tracing::debug!(
                    "Skipping placeholder row with id {}: {}",
                    row.data_record_id,
                    row.name
                );
                continue;
            }

            let artifacts = ArtifactFlags {
                report: row.report,
                tearsheet: row.tearsheet,
                industry_report: row.industry_report,
            };
            let outcome = match row.outcome.as_deref() {
                Some(value) => Outcome::parse(value).ok_or_else(|| StorageError::MalformedRow {
                    line: items.len() as u64 + 2,
                    message: format!("unknown outcome '{}'", value),
                })?,
                None => Outcome::infer(artifacts.report, &row.name),
            };

            items.push(WorkItem {
                index: row.data_record_id as u64,
                outcome,
                note: row.name,
                artifacts,
            });
        }

        Ok(items)
    }

    fn write_rows(&self, items: &[WorkItem]) -> StorageResult<()> {
        write_atomic(&self.log_path, |file: &mut File| {
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(HEADER)?;
            for (row, item) in items.iter().enumerate() {
                writer.write_record([
                    row.to_string().as_str(),
                    flag(item.artifacts.report),
                    flag(item.artifacts.tearsheet),
                    flag(item.artifacts.industry_report),
                    item.index.to_string().as_str(),
                    item.note.as_str(),
                    item.outcome.as_str(),
                ])?;
            }
            writer.flush()?;
            Ok(())
        })
    }
}

impl ProgressStore for CsvProgressStore {
    fn initialize(&mut self, range_size: Option<u64>) -> StorageResult<()> {
        if self.log_path.exists() {
            return Err(StorageError::AlreadyInitialized(self.log_path.clone()));
        }

        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if let Some(dir) = &self.artifact_dir {
            std::fs::create_dir_all(dir)?;
        }

        self.write_rows(&[])?;

        match range_size {
            Some(size) => tracing::info!(
                "Initialized progress log at {} for {} records",
                self.log_path.display(),
                size
            ),
            None => tracing::info!("Initialized progress log at {}", self.log_path.display()),
        }
        Ok(())
    }

    fn load(&self) -> StorageResult<Vec<WorkItem>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        self.read_rows()
    }

    fn append_merge(&mut self, buffer: &CheckpointColumns) -> StorageResult<MergeReport> {
        let existing = self.load()?;
        let previous_max = existing.iter().map(|item| item.index).max();

        let (buffered, truncated) = buffer.to_items();
        let merged_count = buffered.len();

        let (merged, replaced) = merge_records(buffered, existing, self.merge_order);
        self.write_rows(&merged)?;

        let report = MergeReport {
            merged: merged_count,
            truncated,
            replaced,
            total: merged.len(),
            previous_max,
            new_max: merged.iter().map(|item| item.index).max(),
        };

        tracing::info!(
            "Updated progress log from id = {:?} to id = {:?} ({} merged, {} total)",
            report.previous_max,
            report.new_max,
            report.merged,
            report.total
        );
        if report.replaced > 0 {
            tracing::debug!("{} existing rows superseded by fresher entries", report.replaced);
        }

        Ok(report)
    }

    fn reconcile(&mut self) -> StorageResult<usize> {
        let items = self.load()?;
        let before = items.len();
        let deduped = dedupe_by_index(items);
        let removed = before - deduped.len();

        if removed > 0 {
            self.write_rows(&deduped)?;
            tracing::info!("Removed {} duplicate rows from progress log", removed);
        }
        Ok(removed)
    }
}
