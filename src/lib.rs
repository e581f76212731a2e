//! Resume-Crawl: a resumable, checkpointed crawl engine
//!
//! This crate walks a finite, indexed listing one record at a time, downloads the
//! artifact attached to each record, and keeps a durable progress log so that a
//! crashed or killed run picks up where it left off instead of starting over.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Resume-Crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Session error: {0}")]
    Session(#[from] crawler::SessionError),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::ItemState,
        to: state::ItemState,
    },

    #[error("Gave up after {attempts} attempts (last failure at index {last_index:?}): {last_error}")]
    RetriesExhausted {
        attempts: u32,
        last_index: Option<u64>,
        last_error: String,
    },

    #[error("Total record count unknown: the session did not report one and none is configured")]
    UnknownTotal,

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Result type alias for Resume-Crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{sanitize_label, CrawlDriver, Supervisor};
pub use state::{ArtifactFlags, ArtifactKind, Checkpoint, ItemState, Outcome, WorkItem};
pub use storage::{CsvProgressStore, ProgressStore};
