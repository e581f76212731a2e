//! Resume-Crawl main entry point
//!
//! This is the command-line interface for the Resume-Crawl checkpointed crawler.

use anyhow::Context;
use clap::Parser;
use resume_crawl::config::{load_config_with_hash, Config};
use resume_crawl::crawler::{crawl, open_writer};
use resume_crawl::output::{generate_markdown_summary, load_statistics, print_statistics};
use resume_crawl::storage::RunLedger;
use resume_crawl::ProgressStore;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Resume-Crawl: a resumable, checkpointed crawler
///
/// Resume-Crawl walks an indexed listing one record at a time, downloads each
/// record's report and keeps a durable progress log so an interrupted run
/// resumes right after the last recorded index.
#[derive(Parser, Debug)]
#[command(name = "resume-crawl")]
#[command(version)]
#[command(about = "A resumable, checkpointed crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Create an empty progress log and the artifact directory, then exit
    #[arg(long, conflicts_with_all = ["merge", "dry_run", "stats", "export_summary"])]
    init: bool,

    /// Replay the last checkpoint into the progress log, then exit
    #[arg(long, conflicts_with_all = ["init", "dry_run", "stats", "export_summary"])]
    merge: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the progress log and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.init {
        handle_init(&config)?;
    } else if cli.merge {
        handle_merge(&config)?;
    } else if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_crawl(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("resume_crawl=info,warn"),
            1 => EnvFilter::new("resume_crawl=debug,info"),
            2 => EnvFilter::new("resume_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Opens the run ledger if it has been created
fn open_ledger(config: &Config) -> anyhow::Result<Option<RunLedger>> {
    let path = Path::new(&config.output.ledger_path);
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(RunLedger::open(path)?))
}

/// Handles the --init mode: creates the progress log, artifact directory and ledger
fn handle_init(config: &Config) -> anyhow::Result<()> {
    let mut writer = open_writer(config);
    writer
        .store_mut()
        .initialize(config.crawl.range_size)
        .context("initializing progress log")?;
    RunLedger::open(Path::new(&config.output.ledger_path)).context("creating run ledger")?;

    println!("✓ Progress log created at {}", config.output.log_path);
    println!("✓ Artifacts will be stored in {}", config.output.artifact_dir);
    Ok(())
}

/// Handles the --merge mode: replays the checkpoint blob into the progress log
fn handle_merge(config: &Config) -> anyhow::Result<()> {
    let mut writer = open_writer(config);
    match writer.recover()? {
        Some(report) => println!(
            "✓ Merged {} records; progress log now ends at id = {:?} ({} records)",
            report.merged, report.new_max, report.total
        ),
        None => println!("✓ Progress log already contains the last checkpoint"),
    }
    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Resume-Crawl Dry Run ===\n");

    println!("Crawl:");
    println!("  Checkpoint interval: {}", config.crawl.checkpoint_interval);
    match config.crawl.range_size {
        Some(size) => println!("  Range size: {}", size),
        None => println!("  Range size: reported by the listing"),
    }
    println!("  Item delay: {}ms", config.crawl.item_delay_ms);
    println!(
        "  Download polls: {} every {}ms",
        config.crawl.download_polls, config.crawl.poll_interval_ms
    );
    if !config.crawl.fallback_artifacts.is_empty() {
        let kinds: Vec<String> = config
            .crawl
            .fallback_artifacts
            .iter()
            .map(|kind| kind.to_string())
            .collect();
        println!("  Fallback artifacts: {}", kinds.join(", "));
    }

    println!("\nSupervisor:");
    match config.supervisor.max_attempts {
        0 => println!("  Max attempts: unlimited"),
        n => println!("  Max attempts: {}", n),
    }
    println!(
        "  Backoff: {}ms doubling up to {}ms",
        config.supervisor.initial_backoff_ms, config.supervisor.max_backoff_ms
    );
    println!("  Skip after: {} failed attempts", config.supervisor.skip_after);

    println!("\nSession:");
    println!("  Listing: {}", config.session.listing_url);
    println!("  User agent: {}", config.session.user_agent);
    println!("  Rows: {}", config.session.row_selector);

    println!("\nOutput:");
    println!("  Progress log: {}", config.output.log_path);
    println!("  Checkpoint: {}", config.output.checkpoint_path);
    println!("  Artifacts: {}", config.output.artifact_dir);
    println!("  Ledger: {}", config.output.ledger_path);

    let writer = open_writer(config);
    let last = writer.store().last_completed_index()?;
    println!("\n✓ Configuration is valid");
    match last {
        Some(last) => println!("✓ Would resume at index {}", last + 1),
        None => println!("✓ Would start at index 0"),
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the progress log
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Progress log: {}\n", config.output.log_path);

    let writer = open_writer(config);
    let ledger = open_ledger(config)?;
    let stats = load_statistics(writer.store(), ledger.as_ref(), config.crawl.range_size)?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Progress Summary ===\n");
    println!("Progress log: {}", config.output.log_path);
    println!("Output: {}", config.output.summary_path);
    println!();

    let writer = open_writer(config);
    let ledger = open_ledger(config)?;
    let stats = load_statistics(writer.store(), ledger.as_ref(), config.crawl.range_size)?;

    generate_markdown_summary(&stats, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!("Starting crawl of {}", config.session.listing_url);

    match crawl(config, config_hash).await {
        Ok(report) => {
            tracing::info!(
                "Crawl completed: {} of {} records after {} attempts",
                report.records,
                report.total,
                report.attempts
            );
            if !report.skipped.is_empty() {
                tracing::warn!("Skipped indices: {:?}", report.skipped);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
