//! Row parsing helpers for the backlog repository.

use crate::models::{BacklogTask, TaskStatus, TaskType};
use crate::repository::{parse_datetime, parse_datetime_opt};

/// Parse a database row into a BacklogTask.
pub fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<BacklogTask> {
    let errors_str: String = row.get("error_messages")?;
    let error_messages: Vec<String> = serde_json::from_str(&errors_str).unwrap_or_default();

    Ok(BacklogTask {
        task_id: row.get("task_id")?,
        url: row.get("url")?,
        restaurant_name: row.get("restaurant_name")?,
        task_type: TaskType::from_str(&row.get::<_, String>("task_type")?)
            .unwrap_or(TaskType::Text),
        priority: row.get("priority")?,
        status: TaskStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(TaskStatus::Pending),
        retry_count: row.get::<_, i64>("retry_count")?.max(0) as u32,
        max_retries: row.get::<_, i64>("max_retries")?.max(0) as u32,
        persistence_failures: row.get::<_, i64>("persistence_failures")?.max(0) as u32,
        error_messages,
        created_at: parse_datetime(&row.get::<_, String>("created_at")?),
        last_attempt: parse_datetime_opt(row.get("last_attempt")?),
        completed_at: parse_datetime_opt(row.get("completed_at")?),
        next_attempt_at: parse_datetime_opt(row.get("next_attempt_at")?),
        restaurant_id: row.get("restaurant_id")?,
    })
}

/// The stored error list of a task, empty when the task is missing.
pub fn stored_errors(conn: &rusqlite::Connection, task_id: &str) -> crate::repository::Result<Vec<String>> {
    use rusqlite::OptionalExtension;

    let raw: Option<String> = conn
        .query_row(
            "SELECT error_messages FROM backlog_tasks WHERE task_id = ?",
            rusqlite::params![task_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw
        .map(|s| serde_json::from_str(&s).unwrap_or_default())
        .unwrap_or_default())
}

/// Union of two error lists, ordered by their timestamp prefix.
pub fn merge_errors(stored: &[String], ours: &[String]) -> Vec<String> {
    let mut merged = ours.to_vec();
    for entry in stored {
        if !merged.contains(entry) {
            merged.push(entry.clone());
        }
    }
    merged.sort_by_key(|entry| {
        entry
            .split_once(": ")
            .and_then(|(ts, _)| chrono::DateTime::parse_from_rfc3339(ts).ok())
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_errors_keeps_both_sides_in_time_order() {
        let stored = vec![
            "2024-05-01T10:00:00+00:00: first".to_string(),
            "2024-05-01T10:05:00+00:00: from another writer".to_string(),
        ];
        let ours = vec![
            "2024-05-01T10:00:00+00:00: first".to_string(),
            "2024-05-01T10:09:00+00:00: timeout".to_string(),
        ];

        assert_eq!(
            merge_errors(&stored, &ours),
            vec![
                "2024-05-01T10:00:00+00:00: first".to_string(),
                "2024-05-01T10:05:00+00:00: from another writer".to_string(),
                "2024-05-01T10:09:00+00:00: timeout".to_string(),
            ]
        );
    }
}
