//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching and error classification
//! - HTML parsing and link extraction
//! - The database-driven scheduling loop

mod fetcher;
mod parser;
mod scheduler;

pub use fetcher::{build_http_client, ContentFetcher, FetchError, FetchedPage, HttpFetcher};
pub use parser::{parse_html, ParsedPage};
pub use scheduler::{CrawlReport, Scheduler, SchedulerSettings, WorkItem};

use crate::clock::system_clock;
use crate::config::Config;
use crate::storage::open_storage;
use crate::Result;
use std::future::Future;

/// Runs a complete crawl operation
///
/// This is the composition root. It will:
/// 1. Open the storage layer
/// 2. Build the HTTP fetcher
/// 3. Crawl from `seed` until no eligible work remains or `interrupt` resolves
/// 4. Shut the fetcher down
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `seed` - The URL to start from
/// * `interrupt` - Resolves when the crawl should stop early
///
/// # Returns
///
/// * `Ok(Some(CrawlReport))` - Crawl ran to completion
/// * `Ok(None)` - Crawl was interrupted; the current task stays `Running`
/// * `Err(DriftnetError)` - Crawl failed
pub async fn run_crawl<I>(config: &Config, seed: &str, interrupt: I) -> Result<Option<CrawlReport>>
where
    I: Future<Output = ()>,
{
    let clock = system_clock();
    let storage = open_storage(&config.storage.database_path, clock.clone())?;
    let fetcher = HttpFetcher::new(&config.fetcher)?;
    let mut scheduler = Scheduler::new(
        storage,
        fetcher,
        clock,
        SchedulerSettings::from_config(config),
    );

    tracing::info!("Starting crawl from {}", seed);

    let outcome = tokio::select! {
        result = scheduler.crawl(seed) => Some(result),
        _ = interrupt => None,
    };

    scheduler.fetcher().shutdown().await;

    match outcome {
        Some(result) => result.map(Some),
        None => {
            tracing::info!("Crawl interrupted");
            Ok(None)
        }
    }
}
