//! Backlog lookups, statistics and bulk state resets.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::helpers::row_to_task;
use super::{BacklogRepository, Result};
use crate::models::{BacklogStats, BacklogTask, TaskStatus, TaskType};
use crate::repository::format_datetime;

impl BacklogRepository {
    /// Get a task by id.
    pub fn get(&self, task_id: &str) -> Result<Option<BacklogTask>> {
        let conn = self.connect()?;
        let task = conn
            .query_row(
                "SELECT * FROM backlog_tasks WHERE task_id = ?",
                params![task_id],
                |row| row_to_task(row),
            )
            .optional()?;
        Ok(task)
    }

    /// The pending or processing task for a URL and type, if any.
    pub fn find_active(&self, url: &str, task_type: TaskType) -> Result<Option<BacklogTask>> {
        let conn = self.connect()?;
        let task = conn
            .query_row(
                r#"
                SELECT * FROM backlog_tasks
                WHERE url = ? AND task_type = ? AND status IN ('pending', 'processing')
                ORDER BY created_at ASC
                LIMIT 1
                "#,
                params![url, task_type.as_str()],
                |row| row_to_task(row),
            )
            .optional()?;
        Ok(task)
    }

    /// List tasks filtered by status and type, in dequeue order.
    pub fn list(
        &self,
        status: Option<TaskStatus>,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> Result<Vec<BacklogTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM backlog_tasks
            WHERE (?1 IS NULL OR status = ?1)
            AND (?2 IS NULL OR task_type = ?2)
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT ?3
        "#,
        )?;

        let tasks = stmt
            .query_map(
                params![
                    status.map(|s| s.as_str()),
                    task_type.map(|t| t.as_str()),
                    limit as i64
                ],
                |row| row_to_task(row),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Count tasks by status and type.
    pub fn stats(&self) -> Result<BacklogStats> {
        let conn = self.connect()?;

        let mut status_counts: HashMap<String, u64> = HashMap::new();
        {
            let mut stmt =
                conn.prepare("SELECT status, COUNT(*) FROM backlog_tasks GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                let (status, count) = row?;
                status_counts.insert(status, count);
            }
        }

        let mut by_type: HashMap<String, u64> = HashMap::new();
        {
            let mut stmt =
                conn.prepare("SELECT task_type, COUNT(*) FROM backlog_tasks GROUP BY task_type")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                let (task_type, count) = row?;
                by_type.insert(task_type, count);
            }
        }

        let retries_pending: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM backlog_tasks
            WHERE retry_count > 0 AND status IN ('pending', 'processing')
            "#,
            [],
            |row| row.get(0),
        )?;

        let count = |s: TaskStatus| *status_counts.get(s.as_str()).unwrap_or(&0);

        Ok(BacklogStats {
            total: status_counts.values().sum(),
            pending: count(TaskStatus::Pending),
            processing: count(TaskStatus::Processing),
            completed: count(TaskStatus::Completed),
            failed: count(TaskStatus::Failed),
            retries_pending: retries_pending as u64,
            by_type,
        })
    }

    /// Return tasks stuck in processing since before `cutoff` to pending.
    /// Used after a crash left claims behind.
    pub fn reset_stale(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.connect()?;
        let count = conn.execute(
            r#"
            UPDATE backlog_tasks SET status = 'pending'
            WHERE status = 'processing'
            AND (last_attempt IS NULL OR last_attempt < ?)
            "#,
            params![format_datetime(&cutoff)],
        )?;
        Ok(count)
    }

    /// Give failed tasks a fresh set of retries.
    pub fn requeue_failed(&self, task_type: Option<TaskType>) -> Result<usize> {
        let conn = self.connect()?;
        let count = conn.execute(
            r#"
            UPDATE backlog_tasks SET
                status = 'pending',
                retry_count = 0,
                persistence_failures = 0,
                next_attempt_at = NULL
            WHERE status = 'failed'
            AND (?1 IS NULL OR task_type = ?1)
            "#,
            params![task_type.map(|t| t.as_str())],
        )?;
        Ok(count)
    }
}
