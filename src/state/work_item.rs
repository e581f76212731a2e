use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal classification of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    PartialFailure,
    NotFound,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::PartialFailure => "partial_failure",
            Self::NotFound => "not_found",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(Self::Succeeded),
            "partial_failure" => Some(Self::PartialFailure),
            "not_found" => Some(Self::NotFound),
            _ => None,
        }
    }

    /// Infers the outcome of a log row written without an outcome column
    pub fn infer(report_downloaded: bool, note: &str) -> Self {
        if report_downloaded {
            Self::Succeeded
        } else if note.ends_with(NOTE_NOT_FOUND) {
            Self::NotFound
        } else {
            Self::PartialFailure
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Succeeded, Self::PartialFailure, Self::NotFound]
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kinds of artifact a record may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// The primary artifact; its download decides success
    Report,
    Tearsheet,
    IndustryReport,
}

impl ArtifactKind {
    /// Column name used in the progress log and checkpoint blob
    pub fn column(&self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Tearsheet => "tearsheet",
            Self::IndustryReport => "industry-report",
        }
    }

    /// Suffix appended to the sanitized label to name the stored file
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Report => " Report.pdf",
            Self::Tearsheet => " Tearsheet.pdf",
            Self::IndustryReport => " Industry Report.pdf",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Which artifacts were downloaded for a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFlags {
    pub report: bool,
    pub tearsheet: bool,
    #[serde(rename = "industry-report")]
    pub industry_report: bool,
}

impl ArtifactFlags {
    pub fn set(&mut self, kind: ArtifactKind) {
        match kind {
            ArtifactKind::Report => self.report = true,
            ArtifactKind::Tearsheet => self.tearsheet = true,
            ArtifactKind::IndustryReport => self.industry_report = true,
        }
    }

    pub fn get(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Report => self.report,
            ArtifactKind::Tearsheet => self.tearsheet,
            ArtifactKind::IndustryReport => self.industry_report,
        }
    }

    pub fn any(&self) -> bool {
        self.report || self.tearsheet || self.industry_report
    }
}

pub(crate) const NOTE_NOT_FOUND: &str = "-> not found";
pub(crate) const NOTE_ARTIFACT_MISSING: &str = "-> found but report does not exist";
pub(crate) const NOTE_OTHER_ERROR: &str = "-> found but other error";

/// One finished record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Zero-based position in the listing
    pub index: u64,
    pub outcome: Outcome,
    /// Record label on success, label plus failure annotation otherwise
    pub note: String,
    pub artifacts: ArtifactFlags,
}

impl WorkItem {
    pub fn succeeded(index: u64, label: &str, artifacts: ArtifactFlags) -> Self {
        Self {
            index,
            outcome: Outcome::Succeeded,
            note: label.to_string(),
            artifacts,
        }
    }

    pub fn not_found(index: u64, label: &str) -> Self {
        Self {
            index,
            outcome: Outcome::NotFound,
            note: format!("{} {}", label, NOTE_NOT_FOUND),
            artifacts: ArtifactFlags::default(),
        }
    }

    /// Record located but its primary artifact was not offered
    pub fn artifact_missing(index: u64, label: &str, artifacts: ArtifactFlags) -> Self {
        Self {
            index,
            outcome: Outcome::PartialFailure,
            note: format!("{} {}", label, NOTE_ARTIFACT_MISSING),
            artifacts,
        }
    }

    /// Record located but processing failed for any other reason
    pub fn other_error(index: u64, label: &str, artifacts: ArtifactFlags) -> Self {
        Self {
            index,
            outcome: Outcome::PartialFailure,
            note: format!("{} {}", label, NOTE_OTHER_ERROR),
            artifacts,
        }
    }

    /// Placeholder for an index the supervisor gave up on
    pub fn skipped(index: u64, attempts: u32) -> Self {
        Self {
            index,
            outcome: Outcome::NotFound,
            note: format!(
                "record {} -> skipped after {} failed attempts",
                index, attempts
            ),
            artifacts: ArtifactFlags::default(),
        }
    }
}

/// Records finished since the last flush
///
/// Owned by the crawl driver for the length of one pass and handed to the
/// checkpoint writer, which clears it once the contents are durable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    items: Vec<WorkItem>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Highest index held in the buffer
    pub fn last_index(&self) -> Option<u64> {
        self.items.iter().map(|item| item.index).max()
    }
}

impl From<Vec<WorkItem>> for Checkpoint {
    fn from(items: Vec<WorkItem>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_string_roundtrip() {
        for outcome in Outcome::all() {
            assert_eq!(Outcome::parse(outcome.as_str()), Some(outcome));
        }
        assert_eq!(Outcome::parse("yes"), None);
    }

    #[test]
    fn test_outcome_inferred_from_legacy_row() {
        assert_eq!(Outcome::infer(true, "Acme Inc"), Outcome::Succeeded);
        assert_eq!(
            Outcome::infer(false, "Acme Inc -> not found"),
            Outcome::NotFound
        );
        assert_eq!(
            Outcome::infer(false, "Acme Inc -> found but other error"),
            Outcome::PartialFailure
        );
    }

    #[test]
    fn test_failure_notes_are_distinguishable() {
        let flags = ArtifactFlags::default();
        assert_eq!(
            WorkItem::not_found(3, "record 3").note,
            "record 3 -> not found"
        );
        assert_eq!(
            WorkItem::artifact_missing(4, "Acme", flags).note,
            "Acme -> found but report does not exist"
        );
        assert_eq!(
            WorkItem::other_error(5, "Acme", flags).note,
            "Acme -> found but other error"
        );
    }

    #[test]
    fn test_artifact_flags() {
        let mut flags = ArtifactFlags::default();
        assert!(!flags.any());

        flags.set(ArtifactKind::IndustryReport);
        assert!(flags.any());
        assert!(flags.get(ArtifactKind::IndustryReport));
        assert!(!flags.get(ArtifactKind::Report));
    }

    #[test]
    fn test_checkpoint_buffer() {
        let mut checkpoint = Checkpoint::new();
        assert!(checkpoint.is_empty());
        assert_eq!(checkpoint.last_index(), None);

        checkpoint.push(WorkItem::not_found(4, "record 4"));
        checkpoint.push(WorkItem::not_found(5, "record 5"));
        assert_eq!(checkpoint.len(), 2);
        assert_eq!(checkpoint.last_index(), Some(5));

        checkpoint.clear();
        assert!(checkpoint.is_empty());
    }
}
