//! Listing session interface
//!
//! A session is the live connection to the system that lists the records. It
//! is stateful and not reentrant: the driver holds it exclusively for one pass
//! and the supervisor replaces it between passes.

use crate::state::ArtifactKind;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a session
///
/// Everything except `Fatal` is scoped to one record and gets classified into
/// that record's outcome. `Fatal` ends the pass.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Record {index} not found in listing")]
    NotFound { index: u64 },

    #[error("Record {index} offers no {kind} artifact")]
    ArtifactMissing { index: u64, kind: ArtifactKind },

    #[error("Record {index}: {message}")]
    Item { index: u64, message: String },

    #[error("Session lost: {0}")]
    Fatal(String),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// A record located in the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub index: u64,
    /// Raw label as displayed by the listing
    pub label: String,
}

/// Progress of the download started by the last `trigger`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    InProgress,
    /// Download complete; the file sits at this path under a generic name
    Finished(PathBuf),
}

#[async_trait]
pub trait Session: Send {
    /// Loads the full listing; returns the record count it reports, if any
    async fn open(&mut self) -> Result<Option<u64>, SessionError>;

    /// Positions the listing on the record a pass resumes from
    async fn seek(&mut self, index: u64) -> Result<(), SessionError>;

    /// Finds the record at `index`
    async fn locate(&mut self, index: u64) -> Result<Target, SessionError>;

    /// Starts downloading the `kind` artifact of a located record
    async fn trigger(&mut self, target: &Target, kind: ArtifactKind) -> Result<(), SessionError>;

    /// Reports whether the last triggered download has finished
    async fn download_status(&mut self) -> Result<DownloadStatus, SessionError>;

    /// Releases the session; called once per pass whatever its outcome
    async fn close(&mut self);
}

/// Creates a fresh session for every supervised attempt
#[async_trait]
pub trait SessionFactory: Send {
    type Session: Session;

    async fn create(&mut self) -> Result<Self::Session, SessionError>;
}
