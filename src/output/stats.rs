//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::{RefType, TaskState};
use crate::storage::Storage;
use crate::DriftnetError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Number of active URLs
    pub total_urls: u64,

    /// Count of URL tasks by state
    pub tasks_by_state: HashMap<TaskState, u64>,

    /// Number of stored content snapshots
    pub total_raws: u64,
}

impl CrawlStatistics {
    pub fn total_tasks(&self) -> u64 {
        self.tasks_by_state.values().sum()
    }

    pub fn count(&self, state: TaskState) -> u64 {
        self.tasks_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Sums the counts of every state matching `predicate`
    pub fn count_where(&self, predicate: impl Fn(&TaskState) -> bool) -> u64 {
        self.tasks_by_state
            .iter()
            .filter(|(state, _)| predicate(*state))
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(DriftnetError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, DriftnetError> {
    Ok(CrawlStatistics {
        total_urls: storage.count_urls()?,
        tasks_by_state: storage.count_tasks_by_state(RefType::Url)?,
        total_raws: storage.count_raws()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  URLs: {}", stats.total_urls);
    println!("  Tasks: {}", stats.total_tasks());
    println!("  Raw snapshots: {}", stats.total_raws);
    println!();

    println!("Tasks by State:");
    let total = stats.total_tasks();
    for state in TaskState::all_states() {
        let count = stats.count(state);
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    let settled = stats.count_where(TaskState::is_settled);
    let errors = stats.count_where(TaskState::is_error);
    let success_rate = if settled > 0 {
        (stats.count(TaskState::Completed) as f64 / settled as f64) * 100.0
    } else {
        0.0
    };

    if errors > 0 {
        println!("Failed or timed out: {}", errors);
    }
    println!(
        "Success Rate: {:.1}% ({} / {} settled tasks completed)",
        success_rate,
        stats.count(TaskState::Completed),
        settled
    );
}
