//! Supervisor - restarts the crawl driver until the range is exhausted
//!
//! Each attempt replays the last checkpoint blob into the progress log,
//! resumes right after the highest persisted index with a fresh session, and
//! records itself in the run ledger. Failed attempts are retried with
//! exponential backoff until `max-attempts` consecutive attempts make no
//! progress.

use crate::config::{CrawlConfig, SupervisorConfig};
use crate::crawler::driver::{CrawlDriver, PassReport, PassStatus};
use crate::crawler::session::{Session, SessionFactory};
use crate::crawler::writer::CheckpointWriter;
use crate::state::{Checkpoint, WorkItem};
use crate::storage::{AttemptStatus, ProgressStore, RunLedger};
use crate::CrawlError;
use std::collections::HashSet;
use std::path::PathBuf;

/// Summary of a supervised run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    /// Attempts started, including the one that completed
    pub attempts: u32,
    pub total: u64,
    /// Records in the progress log at the end
    pub records: usize,
    /// Indices replaced by skip placeholders
    pub skipped: Vec<u64>,
    /// Indices in `0..total` without a record
    pub gaps: Vec<u64>,
    pub duplicates_removed: usize,
}

/// Resume point for a store whose highest index is `last`
pub fn resume_index(last: Option<u64>) -> u64 {
    last.map_or(0, |index| index + 1)
}

/// Index a failed pass stopped at, if the pass got as far as the loop
fn failed_index(report: &PassReport) -> Option<u64> {
    match report.status {
        PassStatus::Failed(_) => Some(report.last_index.map_or(report.start, |i| i + 1)),
        PassStatus::Completed => None,
    }
}

/// Index that keeps failing and how many attempts failed there
#[derive(Debug, Clone, Copy)]
struct Stall {
    index: u64,
    failures: u32,
}

pub struct Supervisor<F: SessionFactory, P: ProgressStore> {
    factory: F,
    writer: CheckpointWriter<P>,
    ledger: RunLedger,
    crawl: CrawlConfig,
    policy: SupervisorConfig,
    artifact_dir: PathBuf,
    config_hash: String,
}

impl<F: SessionFactory, P: ProgressStore> Supervisor<F, P> {
    pub fn new(
        factory: F,
        writer: CheckpointWriter<P>,
        ledger: RunLedger,
        crawl: CrawlConfig,
        policy: SupervisorConfig,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            factory,
            writer,
            ledger,
            crawl,
            policy,
            artifact_dir: artifact_dir.into(),
            config_hash: String::new(),
        }
    }

    /// Hash recorded with every attempt in the ledger
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    pub fn writer(&self) -> &CheckpointWriter<P> {
        &self.writer
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// Runs attempts until every index in the range has a record
    ///
    /// `total_range` fixes the range size; when `None` the size reported by
    /// the session is used.
    pub async fn run(&mut self, total_range: Option<u64>) -> Result<SupervisorReport, CrawlError> {
        let mut known_total = total_range;
        let mut attempts = 0u32;
        let mut failures = 0u32;
        let mut stall: Option<Stall> = None;
        let mut skipped = Vec::new();

        loop {
            if let Some(report) = self.writer.verify_resume_point()? {
                tracing::info!(
                    "Recovered checkpoint: progress log now ends at id = {:?}",
                    report.new_max
                );
            }

            let resume = resume_index(self.writer.store().last_completed_index()?);
            if let Some(total) = known_total {
                if resume >= total {
                    tracing::info!("All {} records already processed", total);
                    return self.finish(attempts, total, skipped);
                }
            }

            attempts += 1;
            let attempt_id = self.ledger.begin_attempt(resume, &self.config_hash)?;
            tracing::info!("Attempt {} resuming at index {}", attempts, resume);

            let pass = self.attempt(resume, &mut known_total).await;
            let (processed, error) = match &pass {
                Ok(report) => match &report.status {
                    PassStatus::Completed => (report.processed, None),
                    PassStatus::Failed(e) => (report.processed, Some(e.to_string())),
                },
                Err(e) => (0, Some(e.to_string())),
            };

            let Some(error) = error else {
                self.ledger.finish_attempt(
                    attempt_id,
                    AttemptStatus::Completed,
                    known_total,
                    processed,
                    None,
                )?;
                let total = known_total.ok_or(CrawlError::UnknownTotal)?;
                return self.finish(attempts, total, skipped);
            };

            self.ledger.finish_attempt(
                attempt_id,
                AttemptStatus::Failed,
                known_total,
                processed,
                Some(&error),
            )?;

            if let Err(CrawlError::UnknownTotal) = pass {
                self.ledger.abandon_attempt(attempt_id)?;
                return Err(CrawlError::UnknownTotal);
            }

            let next = resume_index(self.writer.store().last_completed_index()?);
            failures = if next > resume { 0 } else { failures + 1 };

            // Only a pass that reached the resume index counts against it
            if let Some(failed_at) = pass.as_ref().ok().and_then(failed_index) {
                if failed_at == next {
                    stall = match stall {
                        Some(s) if s.index == next => Some(Stall {
                            index: next,
                            failures: s.failures + 1,
                        }),
                        _ => Some(Stall {
                            index: next,
                            failures: 1,
                        }),
                    };
                }
            }

            if let Some(s) = stall {
                if self.policy.skip_after > 0 && s.failures >= self.policy.skip_after {
                    self.skip(s)?;
                    skipped.push(s.index);
                    stall = None;
                }
            }

            if self.policy.max_attempts > 0 && failures >= self.policy.max_attempts {
                self.ledger.abandon_attempt(attempt_id)?;
                tracing::error!(
                    "Giving up after {} consecutive failed attempts without progress",
                    failures
                );
                return Err(CrawlError::RetriesExhausted {
                    attempts,
                    last_index: self.writer.store().last_completed_index()?,
                    last_error: error,
                });
            }

            let delay = self.policy.backoff(failures.max(1));
            tracing::warn!(
                "Attempt {} failed ({}); restarting in {:?}",
                attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt: fresh session, one pass, session closed
    async fn attempt(
        &mut self,
        resume: u64,
        known_total: &mut Option<u64>,
    ) -> Result<PassReport, CrawlError> {
        let mut session = self.factory.create().await?;

        let reported = match session.open().await {
            Ok(reported) => reported,
            Err(e) => {
                session.close().await;
                return Err(e.into());
            }
        };

        let total = match (*known_total, reported) {
            (Some(fixed), Some(reported)) if fixed != reported => {
                tracing::warn!(
                    "Listing reports {} records but the range is fixed at {}",
                    reported,
                    fixed
                );
                fixed
            }
            (Some(fixed), _) => fixed,
            (None, Some(reported)) => reported,
            (None, None) => {
                session.close().await;
                return Err(CrawlError::UnknownTotal);
            }
        };
        *known_total = Some(total);

        let report = {
            let mut driver = CrawlDriver::new(&self.crawl, &mut self.writer, &self.artifact_dir);
            driver
                .run_pass(&mut session, resume, total, Checkpoint::new())
                .await
        };
        session.close().await;

        Ok(report)
    }

    /// Writes a placeholder for an index that failed too often
    fn skip(&mut self, stall: Stall) -> Result<(), CrawlError> {
        tracing::warn!(
            "Skipping record {} after {} failed attempts",
            stall.index,
            stall.failures
        );
        let mut placeholder: Checkpoint = vec![WorkItem::skipped(stall.index, stall.failures)].into();
        self.writer.flush(&mut placeholder)?;
        Ok(())
    }

    fn finish(
        &mut self,
        attempts: u32,
        total: u64,
        skipped: Vec<u64>,
    ) -> Result<SupervisorReport, CrawlError> {
        let duplicates_removed = self.writer.store_mut().reconcile()?;
        let items = self.writer.store().load()?;

        let present: HashSet<u64> = items.iter().map(|item| item.index).collect();
        let gaps: Vec<u64> = (0..total).filter(|i| !present.contains(i)).collect();
        if !gaps.is_empty() {
            tracing::warn!(
                "{} indices below {} have no record (first: {})",
                gaps.len(),
                total,
                gaps[0]
            );
        }

        tracing::info!(
            "Crawl finished after {} attempts: {} records, {} skipped",
            attempts,
            items.len(),
            skipped.len()
        );

        Ok(SupervisorReport {
            attempts,
            total,
            records: items.len(),
            skipped,
            gaps,
            duplicates_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_index() {
        assert_eq!(resume_index(None), 0);
        assert_eq!(resume_index(Some(0)), 1);
        assert_eq!(resume_index(Some(41)), 42);
    }
}
