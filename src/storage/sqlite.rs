//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the store traits.

use crate::clock::{format_timestamp, parse_timestamp, system_clock, SharedClock};
use crate::state::{RefType, TaskAction, TaskState};
use crate::storage::schema::{get_schema_version, initialize_schema};
use crate::storage::traits::{RawStore, StorageError, StorageResult, TaskStore, UrlStore};
use crate::storage::{
    ClaimCutoffs, RawPolicy, RawRecord, RawRetention, TaskDefaults, TaskRecord, UrlRecord,
};
use crate::DriftnetError;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

const URL_COLUMNS: &str = "id, url, base_url, title, meta, created_at, updated_at, deleted_at";
const TASK_COLUMNS: &str = "id, ref_id, ref_type, state, action, meta, created_at, updated_at";
const RAW_COLUMNS: &str = "id, url_id, content, meta, created_at, updated_at";

/// Filters out tasks whose URL has been soft-deleted (`t` aliases `tasks`)
const ACTIVE_REF: &str = "NOT EXISTS (
    SELECT 1 FROM urls u
    WHERE t.ref_type = 'url' AND u.id = t.ref_id AND u.deleted_at IS NOT NULL
)";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    clock: SharedClock,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance using the system clock
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(DriftnetError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, DriftnetError> {
        Self::with_clock(path, system_clock())
    }

    /// Creates a new SqliteStorage instance with an explicit clock
    pub fn with_clock(path: &Path, clock: SharedClock) -> Result<Self, DriftnetError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;
        tracing::debug!(
            "Opened {} (schema version {})",
            path.display(),
            get_schema_version(&conn)?
        );

        Ok(Self { conn, clock })
    }

    /// Creates an in-memory database using the system clock
    pub fn open_in_memory() -> Result<Self, DriftnetError> {
        Self::in_memory_with_clock(system_clock())
    }

    /// Creates an in-memory database with an explicit clock
    pub fn in_memory_with_clock(clock: SharedClock) -> Result<Self, DriftnetError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn, clock })
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn select_raw(conn: &Connection, raw_id: i64) -> rusqlite::Result<RawRecord> {
        conn.query_row(
            &format!("SELECT {RAW_COLUMNS} FROM raws WHERE id = ?1"),
            params![raw_id],
            row_to_raw,
        )
    }
}

impl UrlStore for SqliteStorage {
    fn get_or_create_url(
        &mut self,
        url: &str,
        base_url: &str,
    ) -> StorageResult<(UrlRecord, bool)> {
        let now = format_timestamp(self.now());
        let inserted = self.conn.execute(
            "INSERT INTO urls (url, base_url, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(url) DO NOTHING",
            params![url, base_url, now],
        )?;

        let record = self
            .get_url_by_address(url)?
            .ok_or_else(|| StorageError::UrlNotFound(url.to_string()))?;

        Ok((record, inserted > 0))
    }

    fn get_url(&self, url_id: i64) -> StorageResult<Option<UrlRecord>> {
        let url = self
            .conn
            .query_row(
                &format!("SELECT {URL_COLUMNS} FROM urls WHERE id = ?1 AND deleted_at IS NULL"),
                params![url_id],
                row_to_url,
            )
            .optional()?;

        Ok(url)
    }

    fn get_url_by_address(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let url = self
            .conn
            .query_row(
                &format!("SELECT {URL_COLUMNS} FROM urls WHERE url = ?1"),
                params![url],
                row_to_url,
            )
            .optional()?;

        Ok(url)
    }

    fn update_url_details(
        &mut self,
        url_id: i64,
        title: Option<&str>,
        meta: Option<&Value>,
    ) -> StorageResult<()> {
        let now = format_timestamp(self.now());
        let changed = self.conn.execute(
            "UPDATE urls SET title = COALESCE(?1, title), meta = COALESCE(?2, meta), updated_at = ?3
             WHERE id = ?4",
            params![title, meta, now, url_id],
        )?;

        if changed == 0 {
            return Err(StorageError::UrlNotFound(format!("URL ID {}", url_id)));
        }
        Ok(())
    }

    fn soft_delete_url(&mut self, url_id: i64) -> StorageResult<()> {
        let now = format_timestamp(self.now());
        let changed = self.conn.execute(
            "UPDATE urls SET deleted_at = COALESCE(deleted_at, ?1), updated_at = ?1 WHERE id = ?2",
            params![now, url_id],
        )?;

        if changed == 0 {
            return Err(StorageError::UrlNotFound(format!("URL ID {}", url_id)));
        }
        Ok(())
    }

    fn count_urls(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM urls WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl TaskStore for SqliteStorage {
    fn get_or_create_task(
        &mut self,
        ref_id: i64,
        ref_type: RefType,
        defaults: TaskDefaults,
    ) -> StorageResult<(TaskRecord, bool)> {
        let now = format_timestamp(self.now());
        let inserted = self.conn.execute(
            "INSERT INTO tasks (ref_id, ref_type, state, action, meta, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(ref_id, ref_type) DO NOTHING",
            params![
                ref_id,
                ref_type.to_db_string(),
                defaults.state.to_db_string(),
                defaults.action.to_db_string(),
                defaults.meta,
                now
            ],
        )?;

        let task = self
            .get_task(ref_id, ref_type)?
            .ok_or(StorageError::TaskNotFound(ref_id))?;

        Ok((task, inserted > 0))
    }

    fn get_task(&self, ref_id: i64, ref_type: RefType) -> StorageResult<Option<TaskRecord>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE ref_id = ?1 AND ref_type = ?2"),
                params![ref_id, ref_type.to_db_string()],
                row_to_task,
            )
            .optional()?;

        Ok(task)
    }

    fn update_task(
        &mut self,
        task_id: i64,
        state: TaskState,
        action: TaskAction,
        meta: Option<&Value>,
    ) -> StorageResult<TaskRecord> {
        let now = format_timestamp(self.now());
        let task = self
            .conn
            .query_row(
                &format!(
                    "UPDATE tasks SET state = ?1, action = ?2, meta = COALESCE(?3, meta), updated_at = ?4
                     WHERE id = ?5
                     RETURNING {TASK_COLUMNS}"
                ),
                params![
                    state.to_db_string(),
                    action.to_db_string(),
                    meta,
                    now,
                    task_id
                ],
                row_to_task,
            )
            .optional()?
            .ok_or(StorageError::TaskNotFound(task_id))?;

        tracing::debug!("Task {} -> {} ({})", task_id, state, action);
        Ok(task)
    }

    fn claim_task(
        &mut self,
        observed: &TaskRecord,
        cutoffs: ClaimCutoffs,
    ) -> StorageResult<Option<TaskRecord>> {
        let now = format_timestamp(self.now());
        let task = self
            .conn
            .query_row(
                &format!(
                    "UPDATE tasks SET state = ?1, action = ?2, updated_at = ?3
                     WHERE id = ?4 AND state = ?5 AND updated_at = ?6
                       AND (state = ?7
                            OR (state = ?1 AND updated_at < ?9)
                            OR (state NOT IN (?7, ?1) AND updated_at < ?8))
                     RETURNING {TASK_COLUMNS}"
                ),
                params![
                    TaskState::Running.to_db_string(),
                    TaskAction::Crawl.to_db_string(),
                    now,
                    observed.id,
                    observed.state.to_db_string(),
                    format_timestamp(observed.updated_at),
                    TaskState::New.to_db_string(),
                    format_timestamp(cutoffs.expired_before),
                    format_timestamp(cutoffs.resume_before)
                ],
                row_to_task,
            )
            .optional()?;

        Ok(task)
    }

    fn find_first_in_states(
        &self,
        ref_type: RefType,
        states: &[TaskState],
    ) -> StorageResult<Option<TaskRecord>> {
        if states.is_empty() {
            return Ok(None);
        }

        let placeholders = (0..states.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t
             WHERE t.ref_type = ?1 AND t.state IN ({placeholders}) AND {ACTIVE_REF}
             ORDER BY t.updated_at ASC, t.id ASC
             LIMIT 1"
        );

        let values: Vec<&str> = std::iter::once(ref_type.to_db_string())
            .chain(states.iter().map(|s| s.to_db_string()))
            .collect();

        let task = self
            .conn
            .query_row(&sql, params_from_iter(values), row_to_task)
            .optional()?;

        Ok(task)
    }

    fn find_first_pending(
        &self,
        ref_type: RefType,
        resume_before: DateTime<Utc>,
    ) -> StorageResult<Option<TaskRecord>> {
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t
                     WHERE t.ref_type = ?1
                       AND (t.state = ?2 OR (t.state = ?3 AND t.updated_at < ?4))
                       AND {ACTIVE_REF}
                     ORDER BY t.updated_at ASC, t.id ASC
                     LIMIT 1"
                ),
                params![
                    ref_type.to_db_string(),
                    TaskState::New.to_db_string(),
                    TaskState::Running.to_db_string(),
                    format_timestamp(resume_before)
                ],
                row_to_task,
            )
            .optional()?;

        Ok(task)
    }

    fn find_first_expired(
        &self,
        ref_type: RefType,
        older_than: DateTime<Utc>,
    ) -> StorageResult<Option<TaskRecord>> {
        // Pending tasks are found by find_first_pending
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks t
                     WHERE t.ref_type = ?1 AND t.state NOT IN (?2, ?3) AND t.updated_at < ?4
                       AND {ACTIVE_REF}
                     ORDER BY t.updated_at ASC, t.id ASC
                     LIMIT 1"
                ),
                params![
                    ref_type.to_db_string(),
                    TaskState::New.to_db_string(),
                    TaskState::Running.to_db_string(),
                    format_timestamp(older_than)
                ],
                row_to_task,
            )
            .optional()?;

        Ok(task)
    }

    fn count_tasks_by_state(&self, ref_type: RefType) -> StorageResult<HashMap<TaskState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM tasks WHERE ref_type = ?1 GROUP BY state")?;

        let rows = stmt.query_map(params![ref_type.to_db_string()], |row| {
            let state = enum_column(row, 0, TaskState::from_db_string)?;
            let count: i64 = row.get(1)?;
            Ok((state, count as u64))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (state, count) = row?;
            counts.insert(state, count);
        }

        Ok(counts)
    }
}

impl RawStore for SqliteStorage {
    fn upsert_latest_raw(
        &mut self,
        url_id: i64,
        content: &str,
        meta: &Value,
        policy: &RawPolicy,
    ) -> StorageResult<RawRecord> {
        let now = self.now();
        let now_str = format_timestamp(now);
        let tx = self.conn.transaction()?;

        let latest = tx
            .query_row(
                &format!(
                    "SELECT {RAW_COLUMNS} FROM raws WHERE url_id = ?1
                     ORDER BY updated_at DESC, id DESC LIMIT 1"
                ),
                params![url_id],
                row_to_raw,
            )
            .optional()?;

        let raw_id = match latest {
            Some(raw) if now - raw.updated_at < policy.freshness_window => {
                tx.execute(
                    "UPDATE raws SET content = ?1, meta = ?2, updated_at = ?3 WHERE id = ?4",
                    params![content, meta, now_str, raw.id],
                )?;
                tracing::debug!("Overwrote raw {} for URL {}", raw.id, url_id);
                raw.id
            }
            _ => {
                tx.execute(
                    "INSERT INTO raws (url_id, content, meta, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![url_id, content, meta, now_str],
                )?;
                let raw_id = tx.last_insert_rowid();

                if policy.retention == RawRetention::LatestOnly {
                    let pruned = tx.execute(
                        "DELETE FROM raws WHERE url_id = ?1 AND id != ?2",
                        params![url_id, raw_id],
                    )?;
                    if pruned > 0 {
                        tracing::debug!("Pruned {} old raw snapshots for URL {}", pruned, url_id);
                    }
                }

                tracing::debug!("Inserted raw {} for URL {}", raw_id, url_id);
                raw_id
            }
        };

        let record = Self::select_raw(&tx, raw_id)?;
        tx.commit()?;

        Ok(record)
    }

    fn latest_raw(&self, url_id: i64) -> StorageResult<Option<RawRecord>> {
        let raw = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RAW_COLUMNS} FROM raws WHERE url_id = ?1
                     ORDER BY updated_at DESC, id DESC LIMIT 1"
                ),
                params![url_id],
                row_to_raw,
            )
            .optional()?;

        Ok(raw)
    }

    fn list_raws(&self, url_id: i64) -> StorageResult<Vec<RawRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RAW_COLUMNS} FROM raws WHERE url_id = ?1 ORDER BY updated_at DESC, id DESC"
        ))?;

        let raws = stmt
            .query_map(params![url_id], row_to_raw)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raws)
    }

    fn count_raws(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM raws", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn row_to_url(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        base_url: row.get(2)?,
        title: row.get(3)?,
        meta: row.get(4)?,
        created_at: timestamp_column(row, 5)?,
        updated_at: timestamp_column(row, 6)?,
        deleted_at: optional_timestamp_column(row, 7)?,
    })
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        ref_id: row.get(1)?,
        ref_type: enum_column(row, 2, RefType::from_db_string)?,
        state: enum_column(row, 3, TaskState::from_db_string)?,
        action: enum_column(row, 4, TaskAction::from_db_string)?,
        meta: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}

fn row_to_raw(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        url_id: row.get(1)?,
        content: row.get(2)?,
        meta: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
        updated_at: timestamp_column(row, 5)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        parse_timestamp(&value)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn enum_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown value '{}'", raw).into(),
        )
    })
}
