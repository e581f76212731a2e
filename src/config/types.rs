use crate::state::ArtifactKind;
use crate::storage::MergeOrder;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Resume-Crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    pub session: SessionConfig,
    pub output: OutputConfig,
}

/// Crawl driver behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Number of records processed between checkpoint flushes
    #[serde(rename = "checkpoint-interval", default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Fixed size of the index range; when absent the session reports it
    #[serde(rename = "range-size", default)]
    pub range_size: Option<u64>,

    /// Pause after each record (milliseconds)
    #[serde(rename = "item-delay-ms", default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Pause after opening the listing and seeking to the resume row (milliseconds)
    #[serde(rename = "settle-delay-ms", default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Maximum number of download completion polls per artifact
    #[serde(rename = "download-polls", default = "default_download_polls")]
    pub download_polls: u32,

    /// Interval between download completion polls (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Secondary artifacts to fetch when the primary report is missing
    #[serde(rename = "fallback-artifacts", default)]
    pub fallback_artifacts: Vec<ArtifactKind>,
}

impl CrawlConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: default_checkpoint_interval(),
            range_size: None,
            item_delay_ms: default_item_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            download_polls: default_download_polls(),
            poll_interval_ms: default_poll_interval_ms(),
            fallback_artifacts: Vec::new(),
        }
    }
}

/// Restart policy for the supervisor loop
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Maximum number of failed passes before giving up (0 = unlimited)
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first restart (milliseconds)
    #[serde(rename = "initial-backoff-ms", default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the restart delay (milliseconds)
    #[serde(rename = "max-backoff-ms", default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failures at the same index before that index is skipped (0 = never)
    #[serde(rename = "skip-after", default = "default_skip_after")]
    pub skip_after: u32,
}

impl SupervisorConfig {
    /// Backoff before restart number `failures` (1-based), doubling up to the cap
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            skip_after: default_skip_after(),
        }
    }
}

/// Listing session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Page that lists every record
    #[serde(rename = "listing-url")]
    pub listing_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Element whose text carries the total number of records
    #[serde(rename = "total-selector", default = "default_total_selector")]
    pub total_selector: String,

    /// Elements representing one record each
    #[serde(rename = "row-selector", default = "default_row_selector")]
    pub row_selector: String,

    /// Attribute on a row element holding its zero-based record index
    #[serde(rename = "index-attribute", default = "default_index_attribute")]
    pub index_attribute: String,

    /// Element inside a row holding the record label
    #[serde(rename = "label-selector", default = "default_label_selector")]
    pub label_selector: String,

    /// Link texts that identify each artifact kind
    #[serde(rename = "link-text", default)]
    pub link_text: LinkTextConfig,

    /// Timeout for a single HTTP request (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl SessionConfig {
    /// Session settings for `listing_url` with every other field defaulted
    pub fn new(listing_url: impl Into<String>) -> Self {
        Self {
            listing_url: listing_url.into(),
            user_agent: default_user_agent(),
            total_selector: default_total_selector(),
            row_selector: default_row_selector(),
            index_attribute: default_index_attribute(),
            label_selector: default_label_selector(),
            link_text: LinkTextConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Visible link text per artifact kind
#[derive(Debug, Clone, Deserialize)]
pub struct LinkTextConfig {
    #[serde(default = "default_report_text")]
    pub report: String,

    #[serde(default = "default_tearsheet_text")]
    pub tearsheet: String,

    #[serde(rename = "industry-report", default = "default_industry_report_text")]
    pub industry_report: String,
}

impl LinkTextConfig {
    pub fn for_kind(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Report => &self.report,
            ArtifactKind::Tearsheet => &self.tearsheet,
            ArtifactKind::IndustryReport => &self.industry_report,
        }
    }
}

impl Default for LinkTextConfig {
    fn default() -> Self {
        Self {
            report: default_report_text(),
            tearsheet: default_tearsheet_text(),
            industry_report: default_industry_report_text(),
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the CSV progress log
    #[serde(rename = "log-path")]
    pub log_path: String,

    /// Path to the JSON checkpoint blob
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// Directory receiving downloaded artifacts
    #[serde(rename = "artifact-dir")]
    pub artifact_dir: String,

    /// Path to the SQLite run ledger
    #[serde(rename = "ledger-path")]
    pub ledger_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path", default = "default_summary_path")]
    pub summary_path: String,

    /// Row order used when the log is rewritten after a merge
    #[serde(rename = "merge-order", default)]
    pub merge_order: MergeOrder,
}

fn default_checkpoint_interval() -> u64 {
    7
}

fn default_item_delay_ms() -> u64 {
    2_000
}

fn default_settle_delay_ms() -> u64 {
    10_000
}

fn default_download_polls() -> u32 {
    100
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    50
}

fn default_initial_backoff_ms() -> u64 {
    3_000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

fn default_skip_after() -> u32 {
    5
}

fn default_user_agent() -> String {
    format!("resume-crawl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_total_selector() -> String {
    "#tbtext-1070".to_string()
}

fn default_row_selector() -> String {
    "table[data-recordindex]".to_string()
}

fn default_index_attribute() -> String {
    "data-recordindex".to_string()
}

fn default_label_selector() -> String {
    "span".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_report_text() -> String {
    "Download ESG Ratings Report".to_string()
}

fn default_tearsheet_text() -> String {
    "Download Tearsheet".to_string()
}

fn default_industry_report_text() -> String {
    "Download Industry Report".to_string()
}

fn default_summary_path() -> String {
    "./summary.md".to_string()
}
