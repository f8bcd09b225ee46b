//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest listing harvester.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::crawler::{run_harvest, RunOptions};
use sumi_harvest::output::{load_statistics, print_recent, print_statistics};
use sumi_harvest::storage::{SqliteStorage, Storage};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: an incremental listing harvester
///
/// Sumi-Harvest walks a paginated listing, harvests every item it has not
/// seen before, reads text out of embedded images, and re-scores unmatched
/// records against a profile.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "An incremental listing harvester", long_about = None)]
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

    /// Validate config and show what would be walked without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "recent", "rescore_only"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "recent", "rescore_only"])]
    stats: bool,

    /// List the N most recently harvested records and exit
    #[arg(long, value_name = "N", conflicts_with_all = ["dry_run", "stats", "rescore_only"])]
    recent: Option<usize>,

    /// Skip the listing walk and only re-score unmatched records
    #[arg(long, conflicts_with = "no_rescore")]
    rescore_only: bool,

    /// Harvest without re-scoring afterwards
    #[arg(long, conflicts_with = "rescore_only")]
    no_rescore: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(limit) = cli.recent {
        handle_recent(&config, limit)?;
    } else {
        let options = RunOptions {
            harvest: !cli.rescore_only,
            rescore: !cli.no_rescore,
        };
        handle_harvest(config, config_hash, options).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Listing:");
    println!("  Template: {}", config.listing.url_template);
    println!(
        "  Pages: {}..={}",
        config.listing.start_page, config.listing.end_page
    );
    println!("  First page URL: {}", config.listing.page_url(config.listing.start_page));
    println!("  Link selector: {}", config.listing.link_selector);
    println!(
        "  Stop after {} empty or {} fully-known pages (min sample {})",
        config.listing.empty_threshold, config.listing.duplicate_threshold, config.listing.min_sample
    );

    println!("\nDetail Pages:");
    println!("  Body selector: {}", config.detail.body_selector);
    println!("  Fields: {}", config.detail.fields.len());
    for (name, selector) in &config.detail.fields {
        println!("    * {} <- {}", name, selector);
    }
    println!(
        "  Retries: {} ({}ms apart)",
        config.detail.retries, config.detail.retry_delay_ms
    );

    println!("\nEnrichment:");
    println!(
        "  Image ceiling: {} bytes, {}x{} px",
        config.enrichment.max_image_bytes,
        config.enrichment.max_image_width,
        config.enrichment.max_image_height
    );
    println!(
        "  Tiles: {}x{} px, {} px overlap, {} concurrent",
        config.enrichment.tile_width,
        config.enrichment.tile_height,
        config.enrichment.tile_overlap,
        config.enrichment.ocr_concurrency
    );
    println!("  Rewrite: {}", config.enrichment.rewrite);

    println!("\nRe-scoring:");
    println!("  Enabled: {}", config.scoring.enabled);
    println!(
        "  Batch size: {}, cooldown {}ms",
        config.scoring.batch_size, config.scoring.cooldown_ms
    );
    match &config.scoring.profile_path {
        Some(path) => println!("  Profile: {}", path),
        None => println!("  Profile: (none)"),
    }

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    SqliteStorage::new(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(config)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --recent mode: lists the newest records
fn handle_recent(config: &Config, limit: usize) -> anyhow::Result<()> {
    let storage = open_database(config)?;
    let records = storage.get_recent(limit)?;
    print_recent(&records);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    config_hash: String,
    options: RunOptions,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current item and stopping");
            on_signal.cancel();
        }
    });

    if options.harvest {
        tracing::info!(
            "Walking pages {}..={} of {}",
            config.listing.start_page,
            config.listing.end_page,
            config.listing.url_template
        );
    } else {
        tracing::info!("Re-scoring only, skipping the listing walk");
    }

    let summary = run_harvest(config, config_hash, options, cancel)
        .await
        .context("Harvest run failed")?;

    println!("=== Run #{} ===", summary.run_id);
    if let Some(reason) = summary.stop_reason {
        println!("Stop reason: {}", reason);
    }
    println!("Pages walked: {}", summary.pages_walked);
    println!("Candidates: {}", summary.candidates);
    println!("Already known: {}", summary.skipped_existing);
    println!("Harvested: {}", summary.harvested);
    println!("Failed: {}", summary.failed);
    println!("Re-scored: {}", summary.rescored);

    Ok(())
}
