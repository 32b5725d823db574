//! Output module for reporting on the crawl database
//!
//! This module handles loading and printing crawl statistics.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
