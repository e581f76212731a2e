//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl progress,
//! including outcome counts, coverage gaps, the attempt history and the
//! records that did not succeed.

use crate::output::stats::{format_indices, ProgressStatistics};
use crate::output::OutputResult;
use crate::state::{ArtifactKind, Outcome};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of `stats` to `output_path`
///
/// # Arguments
///
/// * `stats` - The progress statistics
/// * `output_path` - Path where the markdown file should be written
pub fn generate_markdown_summary(stats: &ProgressStatistics, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(stats);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats progress statistics as markdown
pub fn format_markdown_summary(stats: &ProgressStatistics) -> String {
    let mut md = String::new();

    md.push_str("# Resume-Crawl Progress Summary\n\n");

    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **Records**: {}\n", stats.total_records));
    match stats.expected_total {
        Some(total) => md.push_str(&format!("- **Expected Records**: {}\n", total)),
        None => md.push_str("- **Expected Records**: unknown\n"),
    }
    if let Some(last) = stats.last_index {
        md.push_str(&format!("- **Last Index**: {}\n", last));
    }
    md.push_str(&format!("- **Coverage**: {:.2}%\n\n", stats.coverage()));

    md.push_str("## Outcome Breakdown\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    for outcome in Outcome::all() {
        md.push_str(&format!(
            "| {} | {} |\n",
            outcome,
            stats.outcome_count(outcome)
        ));
    }
    md.push('\n');

    md.push_str("## Artifacts\n\n");
    md.push_str("| Artifact | Downloaded |\n");
    md.push_str("|----------|------------|\n");
    for kind in [
        ArtifactKind::Report,
        ArtifactKind::Tearsheet,
        ArtifactKind::IndustryReport,
    ] {
        md.push_str(&format!("| {} | {} |\n", kind, stats.artifact_count(kind)));
    }
    md.push('\n');

    if !stats.gaps.is_empty() || !stats.duplicates.is_empty() {
        md.push_str("## Consistency\n\n");
        if !stats.gaps.is_empty() {
            md.push_str(&format!(
                "- **Missing Indices** ({}): {}\n",
                stats.gaps.len(),
                format_indices(&stats.gaps, 50)
            ));
        }
        if !stats.duplicates.is_empty() {
            md.push_str(&format!(
                "- **Duplicate Indices** ({}): {}\n",
                stats.duplicates.len(),
                format_indices(&stats.duplicates, 50)
            ));
        }
        md.push('\n');
    }

    if !stats.recent_attempts.is_empty() {
        md.push_str("## Recent Attempts\n\n");
        md.push_str("| ID | Started | Status | Resume Index | Processed | Error |\n");
        md.push_str("|----|---------|--------|--------------|-----------|-------|\n");
        for attempt in &stats.recent_attempts {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                attempt.id,
                attempt.started_at,
                attempt.status.to_db_string(),
                attempt.resume_index,
                attempt.processed,
                attempt.error.as_deref().unwrap_or("")
            ));
        }
        md.push('\n');
    }

    if !stats.failed.is_empty() {
        md.push_str(&format!("## Failed Records ({})\n\n", stats.failed.len()));
        md.push_str("| Index | Outcome | Note |\n");
        md.push_str("|-------|---------|------|\n");
        for item in &stats.failed {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                item.index,
                item.outcome,
                item.note.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::stats::compute_statistics;
    use crate::state::{ArtifactFlags, WorkItem};

    fn create_test_stats() -> ProgressStatistics {
        let items = vec![
            WorkItem::succeeded(
                0,
                "Acme",
                ArtifactFlags {
                    report: true,
                    ..ArtifactFlags::default()
                },
            ),
            WorkItem::not_found(1, "record 1"),
            WorkItem::artifact_missing(3, "Globex", ArtifactFlags::default()),
        ];
        compute_statistics(&items, Some(4))
    }

    #[test]
    fn test_format_markdown_summary() {
        let md = format_markdown_summary(&create_test_stats());

        assert!(md.contains("# Resume-Crawl Progress Summary"));
        assert!(md.contains("- **Records**: 3"));
        assert!(md.contains("| succeeded | 1 |"));
        assert!(md.contains("| not_found | 1 |"));
    }

    #[test]
    fn test_markdown_lists_gaps_and_failed_records() {
        let md = format_markdown_summary(&create_test_stats());

        assert!(md.contains("- **Missing Indices** (1): 2"));
        assert!(md.contains("## Failed Records (2)"));
        assert!(md.contains("Globex -> found but report does not exist"));
    }

    #[test]
    fn test_markdown_without_failures_omits_section() {
        let stats = compute_statistics(&[], Some(0));
        let md = format_markdown_summary(&stats);

        assert!(!md.contains("## Failed Records"));
        assert!(!md.contains("## Consistency"));
    }

    #[test]
    fn test_generate_markdown_summary_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.md");

        generate_markdown_summary(&create_test_stats(), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("# Resume-Crawl Progress Summary"));
    }
}
