//! Driftnet main entry point
//!
//! This is the command-line interface for the Driftnet crawler.

use anyhow::{bail, Context};
use clap::Parser;
use driftnet::config::{load_config_with_hash, validate_seed, Config};
use driftnet::crawler::run_crawl;
use driftnet::output::{load_statistics, print_statistics};
use driftnet::storage::SqliteStorage;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Driftnet: a restart-safe, revisiting web crawler
///
/// Driftnet keeps its whole frontier in SQLite. Every URL it has seen gets a
/// task that is crawled once and then again whenever it goes stale, so an
/// interrupted crawl simply continues on the next run.
#[derive(Parser, Debug)]
#[command(name = "driftnet")]
#[command(version)]
#[command(about = "A restart-safe, revisiting web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// URL to start from (overrides `seed` in the config)
    #[arg(long, value_name = "URL")]
    seed: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.stats {
        return handle_stats(&config);
    }

    let seed = resolve_seed(cli.seed, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &seed);
        return Ok(());
    }

    handle_crawl(&config, &seed).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("driftnet=info,warn"),
            1 => EnvFilter::new("driftnet=debug,info"),
            2 => EnvFilter::new("driftnet=trace,debug"),
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

/// Picks the command-line seed over the configured one
fn resolve_seed(cli_seed: Option<String>, config: &Config) -> anyhow::Result<String> {
    match cli_seed.or_else(|| config.seed.clone()) {
        Some(seed) => {
            validate_seed(&seed)?;
            Ok(seed)
        }
        None => bail!("No seed URL: pass --seed or set `seed` in the configuration"),
    }
}

/// Handles the --dry-run mode: shows the resolved configuration
fn handle_dry_run(config: &Config, seed: &str) {
    println!("=== Driftnet Dry Run ===\n");

    println!("Seed: {}", seed);

    println!("\nCrawler:");
    println!("  Expiration window: {}s", config.crawler.expiration_window);
    println!("  Resume lease: {}s", config.resume_lease().num_seconds());
    match config.crawler.max_tasks {
        Some(max) => println!("  Max tasks per run: {}", max),
        None => println!("  Max tasks per run: unlimited"),
    }

    println!("\nRaw content:");
    println!("  Freshness window: {}s", config.raw.freshness_window);
    println!("  Retention: {:?}", config.raw.retention);

    println!("\nFetcher:");
    println!("  User agent: {}", config.fetcher.user_agent);
    println!("  Request timeout: {}s", config.fetcher.request_timeout);
    println!("  Connect timeout: {}s", config.fetcher.connect_timeout);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path.display());

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path.display());

    let storage = SqliteStorage::new(&config.storage.database_path)
        .context("Failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, seed: &str) -> anyhow::Result<()> {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match run_crawl(config, seed, interrupt).await {
        Ok(Some(report)) => {
            tracing::info!(
                "Crawl completed: {} tasks processed, {} new URLs",
                report.processed(),
                report.discovered
            );
            Ok(())
        }
        Ok(None) => {
            tracing::info!("Stopped by Ctrl-C; the current task resumes on the next run");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
