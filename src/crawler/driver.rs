//! Crawl driver - one sequential pass over the index range
//!
//! For every index the driver walks the record through
//! `Pending → Located → ActionAttempted → terminal`, appends the finished
//! record to the checkpoint buffer and flushes the buffer every
//! `checkpoint-interval` records. Per-record failures are classified and the
//! pass continues; a fatal failure flushes whatever is buffered and ends it.

use crate::config::CrawlConfig;
use crate::crawler::sanitize::sanitize_label;
use crate::crawler::session::{DownloadStatus, Session, SessionError, Target};
use crate::crawler::writer::CheckpointWriter;
use crate::state::{ArtifactFlags, ArtifactKind, Checkpoint, ItemState, WorkItem};
use crate::storage::ProgressStore;
use crate::CrawlError;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// How a pass ended
#[derive(Debug)]
pub enum PassStatus {
    /// Every index up to the end of the range was processed
    Completed,

    /// A fatal error ended the pass early
    Failed(CrawlError),
}

/// Result of `CrawlDriver::run_pass`
#[derive(Debug)]
pub struct PassReport {
    pub status: PassStatus,
    pub start: u64,
    pub total: u64,
    /// Records that reached a terminal state during this pass
    pub processed: u64,
    pub last_index: Option<u64>,
    pub flushes: usize,
    /// Records still buffered when the pass returned (empty unless the final
    /// flush itself failed)
    pub checkpoint: Checkpoint,
}

impl PassReport {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, PassStatus::Completed)
    }
}

#[derive(Debug, Default)]
struct PassProgress {
    processed: u64,
    last_index: Option<u64>,
    flushes: usize,
}

/// Why fetching one artifact did not produce a stored file
#[derive(Debug)]
enum FetchFailure {
    Session(SessionError),
    TimedOut { polls: u32 },
    Store(std::io::Error),
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session(e) => write!(f, "{}", e),
            Self::TimedOut { polls } => write!(f, "download not finished after {} polls", polls),
            Self::Store(e) => write!(f, "could not store artifact: {}", e),
        }
    }
}

pub struct CrawlDriver<'a, P: ProgressStore> {
    config: &'a CrawlConfig,
    writer: &'a mut CheckpointWriter<P>,
    artifact_dir: PathBuf,
}

impl<'a, P: ProgressStore> CrawlDriver<'a, P> {
    pub fn new(
        config: &'a CrawlConfig,
        writer: &'a mut CheckpointWriter<P>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            writer,
            artifact_dir: artifact_dir.into(),
        }
    }

    /// Processes indices `start..total` and returns the buffer it was given
    /// along with how the pass ended
    pub async fn run_pass<S: Session>(
        &mut self,
        session: &mut S,
        start: u64,
        total: u64,
        checkpoint: Checkpoint,
    ) -> PassReport {
        let mut checkpoint = checkpoint;
        let mut progress = PassProgress::default();
        let started = Instant::now();

        tracing::info!("Starting from idx = {} of {}", start, total);

        let result = self
            .drive(session, start, total, &mut checkpoint, &mut progress)
            .await;

        let status = match result {
            Ok(()) => match self.writer.flush(&mut checkpoint) {
                Ok(flushed) => {
                    if flushed.is_some() {
                        progress.flushes += 1;
                    }
                    tracing::info!(
                        "Pass complete: {} records in {:?}",
                        progress.processed,
                        started.elapsed()
                    );
                    PassStatus::Completed
                }
                Err(e) => {
                    tracing::error!("Final checkpoint flush failed: {}", e);
                    PassStatus::Failed(e.into())
                }
            },
            Err(e) => {
                tracing::error!("{}", e);
                match self.writer.flush(&mut checkpoint) {
                    Ok(Some(_)) => {
                        progress.flushes += 1;
                        tracing::info!("Checkpoint saved after failure");
                    }
                    Ok(None) => {}
                    Err(flush_error) => {
                        tracing::error!("Checkpoint flush after failure failed: {}", flush_error)
                    }
                }
                tracing::warn!("Failed at id = {:?}", progress.last_index);
                PassStatus::Failed(e)
            }
        };

        PassReport {
            status,
            start,
            total,
            processed: progress.processed,
            last_index: progress.last_index,
            flushes: progress.flushes,
            checkpoint,
        }
    }

    async fn drive<S: Session>(
        &mut self,
        session: &mut S,
        start: u64,
        total: u64,
        checkpoint: &mut Checkpoint,
        progress: &mut PassProgress,
    ) -> Result<(), CrawlError> {
        if start >= total {
            return Ok(());
        }

        session.seek(start).await?;
        tokio::time::sleep(self.config.settle_delay()).await;

        let interval = self.config.checkpoint_interval;
        for index in start..total {
            let item = self.process_index(session, index).await?;
            tracing::debug!("Record {} -> {} ({})", index, item.outcome, item.note);

            checkpoint.push(item);
            progress.processed += 1;
            progress.last_index = Some(index);

            if index > start && index % interval == 0 {
                self.writer.flush(checkpoint)?;
                progress.flushes += 1;
                tracing::info!("Checkpoint saved at idx = {}", index);
            }

            tokio::time::sleep(self.config.item_delay()).await;
        }

        Ok(())
    }

    /// Runs one record to a terminal state
    ///
    /// Only fatal failures come back as `Err`; everything else is folded into
    /// the returned record.
    async fn process_index<S: Session>(
        &self,
        session: &mut S,
        index: u64,
    ) -> Result<WorkItem, CrawlError> {
        let mut state = ItemState::Pending;

        let target = match session.locate(index).await {
            Ok(target) => target,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::debug!("Record {} not located: {}", index, e);
                state.fail();
                return Ok(WorkItem::not_found(index, &format!("record {}", index)));
            }
        };
        state.transition(ItemState::Located)?;

        let label = match sanitize_label(&target.label) {
            label if label.is_empty() => format!("record {}", index),
            label => label,
        };

        if let Err(e) = session.trigger(&target, ArtifactKind::Report).await {
            return self
                .classify(session, &target, &label, &mut state, FetchFailure::Session(e))
                .await;
        }
        state.transition(ItemState::ActionAttempted)?;

        match self
            .complete_download(session, index, ArtifactKind::Report, &label)
            .await
        {
            Ok(path) => {
                state.transition(ItemState::Succeeded)?;
                tracing::debug!("Stored {}", path.display());
                let mut artifacts = ArtifactFlags::default();
                artifacts.set(ArtifactKind::Report);
                Ok(WorkItem::succeeded(index, &label, artifacts))
            }
            Err(failure) => {
                self.classify(session, &target, &label, &mut state, failure)
                    .await
            }
        }
    }

    /// Turns a failure after the record was located into its record
    async fn classify<S: Session>(
        &self,
        session: &mut S,
        target: &Target,
        label: &str,
        state: &mut ItemState,
        failure: FetchFailure,
    ) -> Result<WorkItem, CrawlError> {
        state.fail();
        match failure {
            FetchFailure::Session(e) if e.is_fatal() => Err(e.into()),
            FetchFailure::Session(SessionError::ArtifactMissing { .. }) => {
                tracing::info!("{}: primary artifact not offered", label);
                let artifacts = self.fetch_fallbacks(session, target, label).await?;
                Ok(WorkItem::artifact_missing(target.index, label, artifacts))
            }
            other => {
                tracing::warn!("{}: {}", label, other);
                Ok(WorkItem::other_error(
                    target.index,
                    label,
                    ArtifactFlags::default(),
                ))
            }
        }
    }

    /// Downloads the configured secondary artifacts of a record
    async fn fetch_fallbacks<S: Session>(
        &self,
        session: &mut S,
        target: &Target,
        label: &str,
    ) -> Result<ArtifactFlags, CrawlError> {
        let mut artifacts = ArtifactFlags::default();

        for &kind in &self.config.fallback_artifacts {
            if kind == ArtifactKind::Report {
                continue;
            }

            let result = match session.trigger(target, kind).await {
                Ok(()) => {
                    self.complete_download(session, target.index, kind, label)
                        .await
                }
                Err(e) => Err(FetchFailure::Session(e)),
            };

            match result {
                Ok(path) => {
                    tracing::info!("{}: stored {} as {}", label, kind, path.display());
                    artifacts.set(kind);
                }
                Err(FetchFailure::Session(e)) if e.is_fatal() => return Err(e.into()),
                Err(failure) => tracing::debug!("{}: no {} ({})", label, kind, failure),
            }
        }

        Ok(artifacts)
    }

    /// Waits for the triggered download, then moves it under its final name
    async fn complete_download<S: Session>(
        &self,
        session: &mut S,
        index: u64,
        kind: ArtifactKind,
        label: &str,
    ) -> Result<PathBuf, FetchFailure> {
        let downloaded = self.await_download(session).await?;
        self.store_artifact(&downloaded, index, kind, label)
            .await
            .map_err(FetchFailure::Store)
    }

    async fn await_download<S: Session>(&self, session: &mut S) -> Result<PathBuf, FetchFailure> {
        let polls = self.config.download_polls;
        for _ in 0..polls {
            match session
                .download_status()
                .await
                .map_err(FetchFailure::Session)?
            {
                DownloadStatus::Finished(path) => return Ok(path),
                DownloadStatus::InProgress => {
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }
        Err(FetchFailure::TimedOut { polls })
    }

    /// Moves a download to `"{label}{suffix}"`, or `"{label} {index}{suffix}"`
    /// when another record already took that name
    async fn store_artifact(
        &self,
        downloaded: &Path,
        index: u64,
        kind: ArtifactKind,
        label: &str,
    ) -> std::io::Result<PathBuf> {
        let mut destination = self
            .artifact_dir
            .join(format!("{}{}", label, kind.file_suffix()));
        if tokio::fs::try_exists(&destination).await? {
            let renamed = self
                .artifact_dir
                .join(format!("{} {}{}", label, index, kind.file_suffix()));
            tracing::warn!(
                "{} already exists; storing record {} as {}",
                destination.display(),
                index,
                renamed.display()
            );
            destination = renamed;
        }
        tokio::fs::rename(downloaded, &destination).await?;
        Ok(destination)
    }
}
