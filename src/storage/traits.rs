//! Storage traits and error types
//!
//! The scheduler only talks to these traits. Each store must provide atomic
//! get-or-create: concurrent discovery of the same URL must never produce two
//! rows.

use crate::state::{RefType, TaskAction, TaskState};
use crate::storage::{
    ClaimCutoffs, RawPolicy, RawRecord, TaskDefaults, TaskRecord, UrlRecord,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("URL not found: {0}")]
    UrlNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence of canonical URL records
pub trait UrlStore {
    /// Returns the record for `url`, creating it if needed
    ///
    /// # Returns
    ///
    /// The record and whether it was created by this call
    fn get_or_create_url(&mut self, url: &str, base_url: &str)
        -> StorageResult<(UrlRecord, bool)>;

    /// Gets an active (not soft-deleted) URL by ID
    fn get_url(&self, url_id: i64) -> StorageResult<Option<UrlRecord>>;

    /// Gets a URL by its address, including soft-deleted ones
    fn get_url_by_address(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Enriches a URL with a title and/or metadata
    ///
    /// `None` leaves the existing value untouched.
    fn update_url_details(
        &mut self,
        url_id: i64,
        title: Option<&str>,
        meta: Option<&Value>,
    ) -> StorageResult<()>;

    /// Marks a URL as deleted; its task is no longer scheduled
    fn soft_delete_url(&mut self, url_id: i64) -> StorageResult<()>;

    /// Counts active URLs
    fn count_urls(&self) -> StorageResult<u64>;
}

/// Persistence of task records, used as the crawl work queue
pub trait TaskStore {
    /// Returns the task for `(ref_id, ref_type)`, creating it from `defaults` if needed
    ///
    /// An existing task is never modified.
    fn get_or_create_task(
        &mut self,
        ref_id: i64,
        ref_type: RefType,
        defaults: TaskDefaults,
    ) -> StorageResult<(TaskRecord, bool)>;

    /// Gets the task for `(ref_id, ref_type)`
    fn get_task(&self, ref_id: i64, ref_type: RefType) -> StorageResult<Option<TaskRecord>>;

    /// Sets a task's state and action and touches `updated_at`
    ///
    /// `meta` replaces the stored metadata when given.
    fn update_task(
        &mut self,
        task_id: i64,
        state: TaskState,
        action: TaskAction,
        meta: Option<&Value>,
    ) -> StorageResult<TaskRecord>;

    /// Atomically moves a task to `Running` with action `Crawl`
    ///
    /// The update only applies if the row still has the state and
    /// `updated_at` of `observed`, and the task is still eligible:
    /// - `New` tasks always
    /// - `Running` tasks last updated before `cutoffs.resume_before`
    /// - settled tasks last updated before `cutoffs.expired_before`
    ///
    /// # Returns
    ///
    /// The claimed task, or None if another runner holds or changed it
    fn claim_task(
        &mut self,
        observed: &TaskRecord,
        cutoffs: ClaimCutoffs,
    ) -> StorageResult<Option<TaskRecord>>;

    /// Finds the least recently updated task in one of `states`
    fn find_first_in_states(
        &self,
        ref_type: RefType,
        states: &[TaskState],
    ) -> StorageResult<Option<TaskRecord>>;

    /// Finds the least recently updated pending task nobody is working on
    ///
    /// Pending means `New`, or `Running` with no update since `resume_before`.
    fn find_first_pending(
        &self,
        ref_type: RefType,
        resume_before: DateTime<Utc>,
    ) -> StorageResult<Option<TaskRecord>>;

    /// Finds the least recently updated settled task updated before `older_than`
    fn find_first_expired(
        &self,
        ref_type: RefType,
        older_than: DateTime<Utc>,
    ) -> StorageResult<Option<TaskRecord>>;

    /// Counts tasks by state
    fn count_tasks_by_state(&self, ref_type: RefType) -> StorageResult<HashMap<TaskState, u64>>;
}

/// Persistence of fetched page content
pub trait RawStore {
    /// Stores `content` for a URL according to `policy`
    ///
    /// If the URL's most recently updated snapshot is younger than the
    /// policy's freshness window it is overwritten in place; otherwise a new
    /// snapshot is inserted.
    fn upsert_latest_raw(
        &mut self,
        url_id: i64,
        content: &str,
        meta: &Value,
        policy: &RawPolicy,
    ) -> StorageResult<RawRecord>;

    /// Gets the most recently updated snapshot for a URL
    fn latest_raw(&self, url_id: i64) -> StorageResult<Option<RawRecord>>;

    /// Lists all snapshots for a URL, newest first
    fn list_raws(&self, url_id: i64) -> StorageResult<Vec<RawRecord>>;

    /// Counts all snapshots
    fn count_raws(&self) -> StorageResult<u64>;
}

/// Everything the scheduler needs from a backend
pub trait Storage: UrlStore + TaskStore + RawStore {}

impl<T: UrlStore + TaskStore + RawStore> Storage for T {}
