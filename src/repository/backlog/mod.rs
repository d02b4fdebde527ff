//! Durable backlog of enrichment tasks.

mod claim;
mod helpers;
mod state;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use super::{format_datetime, Result};
use crate::models::BacklogTask;
use helpers::{merge_errors, stored_errors};

/// SQLite-backed repository for backlog tasks.
#[derive(Debug, Clone)]
pub struct BacklogRepository {
    db_path: PathBuf,
}

impl BacklogRepository {
    /// Create a new backlog repository.
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS backlog_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                restaurant_name TEXT NOT NULL,
                task_type TEXT NOT NULL DEFAULT 'text',
                priority INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'pending',

                -- Retry tracking
                retry_count INTEGER NOT NULL DEFAULT 0,
                max_retries INTEGER NOT NULL DEFAULT 3,
                persistence_failures INTEGER NOT NULL DEFAULT 0,
                error_messages TEXT NOT NULL DEFAULT '[]',
                next_attempt_at TEXT,

                -- Timing
                created_at TEXT NOT NULL,
                last_attempt TEXT,
                completed_at TEXT,

                restaurant_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_backlog_dequeue
                ON backlog_tasks(status, priority DESC, created_at ASC);
            CREATE INDEX IF NOT EXISTS idx_backlog_type_status
                ON backlog_tasks(task_type, status);
            CREATE INDEX IF NOT EXISTS idx_backlog_url
                ON backlog_tasks(url);
        "#,
        )?;
        Ok(())
    }

    /// Add a task. Returns false if a task with the same id already exists,
    /// in which case nothing is changed.
    pub fn enqueue(&self, task: &BacklogTask) -> Result<bool> {
        let conn = self.connect()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO backlog_tasks (
                task_id, url, restaurant_name, task_type, priority, status,
                retry_count, max_retries, persistence_failures, error_messages,
                next_attempt_at, created_at, last_attempt, completed_at, restaurant_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(task_id) DO NOTHING
            "#,
            params![
                task.task_id,
                task.url,
                task.restaurant_name,
                task.task_type.as_str(),
                task.priority,
                task.status.as_str(),
                task.retry_count as i64,
                task.max_retries as i64,
                task.persistence_failures as i64,
                serde_json::to_string(&task.error_messages)?,
                task.next_attempt_at.as_ref().map(format_datetime),
                format_datetime(&task.created_at),
                task.last_attempt.as_ref().map(format_datetime),
                task.completed_at.as_ref().map(format_datetime),
                task.restaurant_id,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Write back every mutable column of a task.
    ///
    /// The error list is append-only: entries stored by another writer since
    /// the task was read are kept alongside the task's own.
    pub fn update(&self, task: &BacklogTask) -> Result<()> {
        let conn = self.connect()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<()> = (|| {
            let stored = stored_errors(&conn, &task.task_id)?;
            let errors = merge_errors(&stored, &task.error_messages);

            conn.execute(
                r#"
                UPDATE backlog_tasks SET
                    priority = ?2,
                    status = ?3,
                    retry_count = ?4,
                    max_retries = ?5,
                    persistence_failures = ?6,
                    error_messages = ?7,
                    next_attempt_at = ?8,
                    last_attempt = ?9,
                    completed_at = ?10,
                    restaurant_id = ?11
                WHERE task_id = ?1
                "#,
                params![
                    task.task_id,
                    task.priority,
                    task.status.as_str(),
                    task.retry_count as i64,
                    task.max_retries as i64,
                    task.persistence_failures as i64,
                    serde_json::to_string(&errors)?,
                    task.next_attempt_at.as_ref().map(format_datetime),
                    task.last_attempt.as_ref().map(format_datetime),
                    task.completed_at.as_ref().map(format_datetime),
                    task.restaurant_id,
                ],
            )?;
            Ok(())
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }

        result
    }

    /// Append one error entry without touching any other column.
    /// Returns false when the task does not exist.
    pub fn append_error(&self, task_id: &str, entry: &str) -> Result<bool> {
        let conn = self.connect()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<bool> = (|| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT id FROM backlog_tasks WHERE task_id = ?",
                    params![task_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Ok(false);
            }

            let mut errors = stored_errors(&conn, task_id)?;
            errors.push(entry.to_string());
            conn.execute(
                "UPDATE backlog_tasks SET error_messages = ?2 WHERE task_id = ?1",
                params![task_id, serde_json::to_string(&errors)?],
            )?;
            Ok(true)
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }

        result
    }
}
