//! Task claiming operations for the backlog repository.
//!
//! Dequeue order is priority descending, then creation time ascending, with
//! the row id as a final tiebreak.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::helpers::row_to_task;
use super::{BacklogRepository, Result};
use crate::models::{BacklogTask, TaskStatus, TaskType};
use crate::repository::{format_datetime, RepositoryError};

impl BacklogRepository {
    /// Tasks that are eligible to run now, in dequeue order. Does not claim.
    pub fn get_pending(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<BacklogTask>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM backlog_tasks
            WHERE status = 'pending'
            AND retry_count < max_retries
            AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT ?
        "#,
        )?;

        let tasks = stmt
            .query_map(params![format_datetime(&now), limit as i64], |row| {
                row_to_task(row)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Claim one specific task. Returns true only for the caller that moved
    /// it from pending to processing.
    pub fn claim(&self, task_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE backlog_tasks SET status = 'processing', last_attempt = ?
            WHERE task_id = ? AND status = 'pending' AND retry_count < max_retries
            "#,
            params![format_datetime(&now), task_id],
        )?;
        Ok(changed == 1)
    }

    /// Atomically claim the next eligible task.
    pub fn claim_next(
        &self,
        task_type: Option<TaskType>,
        now: DateTime<Utc>,
    ) -> Result<Option<BacklogTask>> {
        Ok(self.claim_batch(1, task_type, now)?.into_iter().next())
    }

    /// Atomically claim up to `limit` eligible tasks.
    pub fn claim_batch(
        &self,
        limit: usize,
        task_type: Option<TaskType>,
        now: DateTime<Utc>,
    ) -> Result<Vec<BacklogTask>> {
        let conn = self.connect()?;
        let now_str = format_datetime(&now);

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: std::result::Result<Vec<BacklogTask>, RepositoryError> = (|| {
            let mut stmt = conn.prepare(
                r#"
                SELECT * FROM backlog_tasks
                WHERE status = 'pending'
                AND retry_count < max_retries
                AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                AND (?2 IS NULL OR task_type = ?2)
                ORDER BY priority DESC, created_at ASC, id ASC
                LIMIT ?3
            "#,
            )?;
            let tasks: Vec<BacklogTask> = stmt
                .query_map(
                    params![now_str, task_type.map(|t| t.as_str()), limit as i64],
                    |row| row_to_task(row),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for task in &tasks {
                conn.execute(
                    "UPDATE backlog_tasks SET status = 'processing', last_attempt = ? WHERE task_id = ?",
                    params![now_str, task.task_id],
                )?;
            }

            Ok(tasks
                .into_iter()
                .map(|mut t| {
                    t.status = TaskStatus::Processing;
                    t.last_attempt = Some(now);
                    t
                })
                .collect())
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }

        result
    }
}
