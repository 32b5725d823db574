//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - URL records (the deduplicated crawl frontier)
//! - Task records (the scheduling state of every URL)
//! - Raw content snapshots

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RawStore, Storage, StorageError, StorageResult, TaskStore, UrlStore};

use crate::clock::SharedClock;
use crate::state::{TaskAction, TaskState};
use crate::DriftnetError;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `clock` - Time source used for every timestamp the store writes
pub fn open_storage(path: &Path, clock: SharedClock) -> Result<SqliteStorage, DriftnetError> {
    SqliteStorage::with_clock(path, clock)
}

/// Represents a URL in the database
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    pub id: i64,
    pub url: String,
    pub base_url: String,
    pub title: Option<String>,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UrlRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Represents a task in the database
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: i64,
    pub ref_id: i64,
    pub ref_type: crate::state::RefType,
    pub state: TaskState,
    pub action: TaskAction,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Initial values for a task created by `get_or_create_task`
#[derive(Debug, Clone)]
pub struct TaskDefaults {
    pub state: TaskState,
    pub action: TaskAction,
    pub meta: Option<Value>,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            state: TaskState::New,
            action: TaskAction::Unknown,
            meta: None,
        }
    }
}

/// Instants before which a task may be taken over by a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimCutoffs {
    /// A settled task last updated before this has expired
    pub expired_before: DateTime<Utc>,

    /// A `Running` task last updated before this has lost its runner
    pub resume_before: DateTime<Utc>,
}

/// Represents a raw content snapshot in the database
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: i64,
    pub url_id: i64,
    pub content: String,
    pub meta: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What happens to superseded raw snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RawRetention {
    /// Older snapshots stay in the store
    #[default]
    KeepHistory,

    /// Inserting a new snapshot deletes the older ones for that URL
    LatestOnly,
}

/// Controls how `upsert_latest_raw` treats an existing snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPolicy {
    /// A snapshot younger than this is overwritten in place
    pub freshness_window: Duration,
    pub retention: RawRetention,
}

impl Default for RawPolicy {
    fn default() -> Self {
        Self {
            freshness_window: Duration::weeks(1),
            retention: RawRetention::KeepHistory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_raw_policy_is_one_week() {
        let policy = RawPolicy::default();
        assert_eq!(policy.freshness_window, Duration::days(7));
        assert_eq!(policy.retention, RawRetention::KeepHistory);
    }

    #[test]
    fn test_task_defaults_start_new() {
        let defaults = TaskDefaults::default();
        assert_eq!(defaults.state, TaskState::New);
        assert_eq!(defaults.action, TaskAction::Unknown);
    }
}
