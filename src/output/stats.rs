//! Statistics over the progress log and run ledger
//!
//! This module provides functionality for extracting and displaying
//! progress statistics from the storage layer.

use crate::output::OutputResult;
use crate::state::{ArtifactKind, Outcome, WorkItem};
use crate::storage::{AttemptRecord, ProgressStore, RunLedger};
use std::collections::{BTreeMap, HashMap};

/// Attempts listed by `--stats` and in the summary
pub const RECENT_ATTEMPTS: usize = 10;

/// Progress statistics summary
#[derive(Debug, Clone, Default)]
pub struct ProgressStatistics {
    /// Rows in the progress log
    pub total_records: usize,

    /// Size of the index range, when known
    pub expected_total: Option<u64>,

    /// Highest index recorded
    pub last_index: Option<u64>,

    /// Count of records by outcome
    pub by_outcome: HashMap<Outcome, u64>,

    /// Count of records holding each artifact kind
    pub artifacts: HashMap<ArtifactKind, u64>,

    /// Indices without a record, below the expected total (or the last index)
    pub gaps: Vec<u64>,

    /// Indices recorded more than once
    pub duplicates: Vec<u64>,

    /// Records whose outcome is not `Succeeded`, in index order
    pub failed: Vec<WorkItem>,

    /// Most recent supervised attempts, newest first
    pub recent_attempts: Vec<AttemptRecord>,
}

impl ProgressStatistics {
    pub fn outcome_count(&self, outcome: Outcome) -> u64 {
        self.by_outcome.get(&outcome).copied().unwrap_or(0)
    }

    pub fn artifact_count(&self, kind: ArtifactKind) -> u64 {
        self.artifacts.get(&kind).copied().unwrap_or(0)
    }

    /// Share of the range covered by at least one record (percent)
    pub fn coverage(&self) -> f64 {
        let expected = match (self.expected_total, self.last_index) {
            (Some(total), _) => total,
            (None, Some(last)) => last + 1,
            (None, None) => return 0.0,
        };
        if expected == 0 {
            return 100.0;
        }
        let covered = expected.saturating_sub(self.gaps.len() as u64);
        (covered as f64 / expected as f64) * 100.0
    }
}

/// Computes statistics over a set of records
pub fn compute_statistics(items: &[WorkItem], expected_total: Option<u64>) -> ProgressStatistics {
    let mut by_outcome = HashMap::new();
    let mut artifacts = HashMap::new();
    let mut seen: BTreeMap<u64, u32> = BTreeMap::new();

    for item in items {
        *by_outcome.entry(item.outcome).or_insert(0) += 1;
        for kind in [
            ArtifactKind::Report,
            ArtifactKind::Tearsheet,
            ArtifactKind::IndustryReport,
        ] {
            if item.artifacts.get(kind) {
                *artifacts.entry(kind).or_insert(0) += 1;
            }
        }
        *seen.entry(item.index).or_insert(0) += 1;
    }

    let last_index = seen.keys().next_back().copied();
    let upper = expected_total.or(last_index.map(|last| last + 1)).unwrap_or(0);
    let gaps = (0..upper).filter(|i| !seen.contains_key(i)).collect();
    let duplicates = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(index, _)| *index)
        .collect();

    let mut failed: Vec<WorkItem> = items
        .iter()
        .filter(|item| item.outcome != Outcome::Succeeded)
        .cloned()
        .collect();
    failed.sort_by_key(|item| item.index);

    ProgressStatistics {
        total_records: items.len(),
        expected_total,
        last_index,
        by_outcome,
        artifacts,
        gaps,
        duplicates,
        failed,
        recent_attempts: Vec::new(),
    }
}

/// Loads statistics from the progress store and, if given, the run ledger
///
/// # Arguments
///
/// * `store` - The progress store to read
/// * `ledger` - Run ledger providing the attempt history
/// * `expected_total` - Size of the index range, when known
pub fn load_statistics(
    store: &dyn ProgressStore,
    ledger: Option<&RunLedger>,
    expected_total: Option<u64>,
) -> OutputResult<ProgressStatistics> {
    let items = store.load()?;
    let mut stats = compute_statistics(&items, expected_total);

    if let Some(ledger) = ledger {
        stats.recent_attempts = ledger.recent_attempts(RECENT_ATTEMPTS)?;
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &ProgressStatistics) {
    println!("=== Progress Statistics ===\n");

    println!("Overview:");
    println!("  Records: {}", stats.total_records);
    match stats.expected_total {
        Some(total) => println!("  Expected records: {}", total),
        None => println!("  Expected records: unknown"),
    }
    println!("  Last index: {:?}", stats.last_index);
    println!("  Coverage: {:.1}%", stats.coverage());
    println!();

    println!("Records by Outcome:");
    for outcome in Outcome::all() {
        let count = stats.outcome_count(outcome);
        let percentage = if stats.total_records > 0 {
            (count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", outcome, count, percentage);
    }
    println!();

    println!("Artifacts Downloaded:");
    for kind in [
        ArtifactKind::Report,
        ArtifactKind::Tearsheet,
        ArtifactKind::IndustryReport,
    ] {
        println!("  {}: {}", kind.column(), stats.artifact_count(kind));
    }
    println!();

    if !stats.gaps.is_empty() {
        println!("Missing Indices ({}):", stats.gaps.len());
        println!("  {}", format_indices(&stats.gaps, 20));
        println!();
    }

    if !stats.duplicates.is_empty() {
        println!("Duplicate Indices ({}):", stats.duplicates.len());
        println!("  {}", format_indices(&stats.duplicates, 20));
        println!();
    }

    if !stats.recent_attempts.is_empty() {
        println!("Recent Attempts:");
        for attempt in &stats.recent_attempts {
            println!(
                "  #{} {} from {} ({} processed){}",
                attempt.id,
                attempt.status.to_db_string(),
                attempt.resume_index,
                attempt.processed,
                attempt
                    .error
                    .as_deref()
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default()
            );
        }
    }
}

/// Comma-separated indices, cut off after `limit` entries
pub fn format_indices(indices: &[u64], limit: usize) -> String {
    let shown: Vec<String> = indices.iter().take(limit).map(u64::to_string).collect();
    let mut out = shown.join(", ");
    if indices.len() > limit {
        out.push_str(&format!(", ... ({} more)", indices.len() - limit));
    }
    out
}
