//! Crawler module for walking the listing and checkpointing progress
//!
//! This module contains the core crawling logic, including:
//! - The session seam and its HTTP implementation
//! - The driver that runs one pass over the index range
//! - The checkpoint writer that makes progress durable
//! - The supervisor that restarts failed passes

mod driver;
mod http_session;
mod sanitize;
mod session;
mod supervisor;
mod writer;

pub use driver::{CrawlDriver, PassReport, PassStatus};
pub use http_session::{
    build_http_client, parse_listing, HttpSession, HttpSessionFactory, Listing, ListingRow,
};
pub use sanitize::sanitize_label;
pub use session::{DownloadStatus, Session, SessionError, SessionFactory, Target};
pub use supervisor::{resume_index, Supervisor, SupervisorReport};
pub use writer::CheckpointWriter;

use crate::config::Config;
use crate::storage::{CsvProgressStore, RunLedger};
use crate::CrawlError;
use std::path::{Path, PathBuf};

/// Downloads land here before being renamed into the artifact directory
pub fn download_dir(config: &Config) -> PathBuf {
    Path::new(&config.output.artifact_dir).join(".incoming")
}

/// Builds the checkpoint writer over the configured CSV progress log
pub fn open_writer(config: &Config) -> CheckpointWriter<CsvProgressStore> {
    let store = CsvProgressStore::new(&config.output.log_path, config.output.merge_order)
        .with_artifact_dir(&config.output.artifact_dir);
    CheckpointWriter::new(store, &config.output.checkpoint_path)
}

/// Runs a supervised crawl over the configured listing
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Replay the last checkpoint into the progress log
/// 2. Resume after the highest recorded index with a fresh HTTP session
/// 3. Restart failed passes until every index has a record
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash recorded with every attempt in the run ledger
pub async fn crawl(config: Config, config_hash: &str) -> Result<SupervisorReport, CrawlError> {
    let writer = open_writer(&config);
    let ledger = RunLedger::open(Path::new(&config.output.ledger_path))?;
    let factory = HttpSessionFactory::new(config.session.clone(), download_dir(&config));

    let mut supervisor = Supervisor::new(
        factory,
        writer,
        ledger,
        config.crawl.clone(),
        config.supervisor.clone(),
        &config.output.artifact_dir,
    )
    .with_config_hash(config_hash);

    supervisor.run(config.crawl.range_size).await
}
