//! doc-ingest main entry point
//!
//! This is the command-line interface for the document ingestion pipeline.

use anyhow::Context;
use clap::Parser;
use doc_ingest::config::{load_config_with_hash, Config};
use doc_ingest::discovery::{read_url_list, DiscoveredUrl, SitemapCrawler};
use doc_ingest::output::{load_statistics, print_alerts, print_run_report, print_statistics};
use doc_ingest::pipeline::IngestPipeline;
use doc_ingest::storage::open_storage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// doc-ingest: resilient document fetching with run-health alerting
///
/// Fetches every discovered documentation URL with retries, backoff and a
/// size cap, records per-run metrics, and raises alerts on unhealthy runs.
#[derive(Parser, Debug)]
#[command(name = "doc-ingest")]
#[command(version = "1.0.0")]
#[command(about = "Resilient document ingestion with run-health alerting", long_about = None)]
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

    /// Ingest the URLs listed in FILE (one per line, optional lastmod)
    #[arg(long, value_name = "FILE", conflicts_with_all = ["sitemap", "check_staleness", "stats", "dry_run"])]
    urls: Option<PathBuf>,

    /// Ingest every URL reachable from the sitemap (or sitemap index) at URL
    #[arg(long, value_name = "URL", conflicts_with_all = ["check_staleness", "stats", "dry_run"])]
    sitemap: Option<String>,

    /// Raise an alert if the last completed run is too old, then exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    check_staleness: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and print the effective settings without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.check_staleness {
        handle_check_staleness(&config)?;
    } else if let Some(urls) = &cli.urls {
        let discovered = read_url_list(urls)
            .with_context(|| format!("Failed to read URL list {}", urls.display()))?;
        tracing::info!("Loaded {} URLs from {}", discovered.len(), urls.display());
        handle_ingest(&config, &discovered).await?;
    } else if let Some(sitemap) = &cli.sitemap {
        let crawler = SitemapCrawler::new(&config.fetch, config.discovery.clone())?;
        let discovered = crawler.discover(sitemap).await;
        handle_ingest(&config, &discovered).await?;
    } else {
        anyhow::bail!(
            "Nothing to do: pass --urls, --sitemap, --check-staleness, --stats or --dry-run"
        );
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("doc_ingest=info,warn"),
            1 => EnvFilter::new("doc_ingest=debug,info"),
            2 => EnvFilter::new("doc_ingest=trace,debug"),
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

/// Handles the --dry-run mode: prints the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== doc-ingest Dry Run ===\n");

    let fetch = &config.fetch;
    println!("Fetch:");
    println!("  Request timeout: {}s", fetch.request_timeout_secs);
    println!("  Max retries: {}", fetch.max_retries);
    println!("  Backoff base: {}", fetch.backoff_base);
    println!("  Throttle delay: {}ms", fetch.throttle_delay_ms);
    println!("  Max content size: {} bytes", fetch.max_content_size);
    println!("  Chunk size: {} bytes", fetch.chunk_size);
    println!("  Transient statuses: {:?}", fetch.transient_status_codes);
    println!("  User agent: {}", fetch.user_agent);

    let alerts = &config.alerts;
    println!("\nAlert Thresholds:");
    println!(
        "  Failure rate: warning {}%, critical {}%",
        alerts.failure_rate_warning, alerts.failure_rate_critical
    );
    println!(
        "  Staleness: warning {}h, critical {}h",
        alerts.staleness_warning_hours, alerts.staleness_critical_hours
    );
    println!("  Minimum rows: {}", alerts.empty_result_min_rows);
    println!(
        "  Performance degradation factor: {}x",
        alerts.performance_degradation_factor
    );

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);
    println!("  History window: {} runs", config.storage.history_window);

    println!("\nDiscovery:");
    println!("  Child sitemap delay: {}ms", config.discovery.child_delay_ms);
    println!("  Max index depth: {}", config.discovery.max_depth);

    println!("\nIngest:");
    println!("  Stage: {}", config.ingest.stage);
    println!(
        "  Skip after consecutive failures: {}",
        config.ingest.max_consecutive_failures
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage, config.storage.history_window)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --check-staleness mode
fn handle_check_staleness(config: &Config) -> anyhow::Result<()> {
    let mut pipeline = IngestPipeline::new(config)?;
    let alerts = pipeline.check_staleness()?;
    print_alerts(&alerts);
    Ok(())
}

/// Handles the main ingestion run
async fn handle_ingest(config: &Config, discovered: &[DiscoveredUrl]) -> anyhow::Result<()> {
    let mut pipeline = IngestPipeline::new(config)?;
    match pipeline.run(discovered).await {
        Ok(report) => {
            print_run_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Ingestion failed: {}", e);
            Err(e.into())
        }
    }
}
