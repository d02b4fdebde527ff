//! Backlog task model and its lifecycle transitions.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a backlog task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What a backlog task should extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Summary and menu from page text.
    #[default]
    Text,
    /// Image discovery and classification only.
    Images,
    /// Text and images.
    Comprehensive,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Images => "images",
            Self::Comprehensive => "comprehensive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "images" => Some(Self::Images),
            "comprehensive" => Some(Self::Comprehensive),
            _ => None,
        }
    }

    pub fn wants_text(&self) -> bool {
        matches!(self, Self::Text | Self::Comprehensive)
    }

    pub fn wants_images(&self) -> bool {
        matches!(self, Self::Images | Self::Comprehensive)
    }
}

/// Delay before a failed task may be claimed again.
///
/// Exponential in the retry count and capped, so the delay never decreases
/// as retries accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "duration_secs")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `retry_count`-th failure (1-based).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay.max(self.base_delay);
        }
        Duration::from_secs_f64(secs)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A durable, retryable unit of enrichment work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogTask {
    pub task_id: String,
    pub url: String,
    pub restaurant_name: String,
    pub task_type: TaskType,
    /// Higher runs first.
    pub priority: i32,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Persistence-class failures, counted apart from `retry_count`.
    pub persistence_failures: u32,
    /// Entries formatted as `"<rfc3339>: <message>"`, oldest first.
    pub error_messages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Earliest time this task may be claimed.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub restaurant_id: Option<i64>,
}

impl BacklogTask {
    /// Create a pending task with the default id format.
    pub fn new(url: &str, restaurant_name: &str, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            task_id: Self::default_task_id(task_type, restaurant_name, now),
            url: url.to_string(),
            restaurant_name: restaurant_name.to_string(),
            task_type,
            priority: 1,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            persistence_failures: 0,
            error_messages: Vec::new(),
            created_at: now,
            last_attempt: None,
            completed_at: None,
            next_attempt_at: None,
            restaurant_id: None,
        }
    }

    /// `"{task_type}_{restaurant_name}_{unix_ts}"`.
    pub fn default_task_id(task_type: TaskType, restaurant_name: &str, at: DateTime<Utc>) -> String {
        format!("{}_{}_{}", task_type.as_str(), restaurant_name, at.timestamp())
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_restaurant(mut self, restaurant_id: i64) -> Self {
        self.restaurant_id = Some(restaurant_id);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries && self.status != TaskStatus::Completed
    }

    /// Most recent error message, without its timestamp prefix.
    pub fn last_error(&self) -> Option<&str> {
        self.error_messages.last().map(|e| match e.split_once(": ") {
            Some((_, msg)) => msg,
            None => e.as_str(),
        })
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Processing;
        self.last_attempt = Some(now);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.next_attempt_at = None;
    }

    /// Record a failed extraction attempt.
    ///
    /// Permanent failures go straight to `Failed` without consuming retries.
    /// Otherwise the retry count is bumped and the task returns to `Pending`
    /// until it has used all of its retries.
    pub fn mark_failed(
        &mut self,
        error: &str,
        permanent: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) {
        self.push_error(error, now);
        self.last_attempt = Some(now);

        if permanent {
            self.status = TaskStatus::Failed;
            self.next_attempt_at = None;
            return;
        }

        self.retry_count = (self.retry_count + 1).min(self.max_retries);
        if self.retry_count >= self.max_retries {
            self.status = TaskStatus::Failed;
            self.next_attempt_at = None;
        } else {
            self.status = TaskStatus::Pending;
            self.next_attempt_at = Some(now + to_chrono(policy.delay_for(self.retry_count)));
        }
    }

    /// Record a failed write to the record store. Leaves `retry_count` alone.
    pub fn mark_persistence_failed(&mut self, error: &str, policy: &RetryPolicy, now: DateTime<Utc>) {
        self.push_error(&format!("persistence: {}", error), now);
        self.last_attempt = Some(now);
        self.persistence_failures += 1;

        if self.persistence_failures >= self.max_retries {
            self.status = TaskStatus::Failed;
            self.next_attempt_at = None;
        } else {
            self.status = TaskStatus::Pending;
            self.next_attempt_at =
                Some(now + to_chrono(policy.delay_for(self.persistence_failures)));
        }
    }

    /// Record the failure that created this task. Consumes no retry; the
    /// task becomes claimable after the base delay, or fails outright when
    /// the error is permanent.
    pub fn note_initial_failure(
        &mut self,
        error: &str,
        permanent: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) {
        self.push_error(error, now);
        self.last_attempt = Some(now);
        if permanent {
            self.status = TaskStatus::Failed;
            self.next_attempt_at = None;
        } else {
            self.status = TaskStatus::Pending;
            self.next_attempt_at = Some(now + to_chrono(policy.base_delay));
        }
    }

    /// Record an error against the task without changing its state. Used
    /// when another worker holds the claim. Returns the stored entry.
    pub fn note_error(&mut self, error: &str, now: DateTime<Utc>) -> String {
        self.push_error(error, now);
        self.error_messages.last().cloned().unwrap_or_default()
    }

    fn push_error(&mut self, error: &str, now: DateTime<Utc>) {
        self.error_messages
            .push(format!("{}: {}", now.to_rfc3339(), error));
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::hours(1))
}

/// Aggregate backlog counts for operational reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacklogStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    /// Pending or processing tasks that have failed at least once.
    pub retries_pending: u64,
    pub by_type: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_retry_delay_is_non_decreasing_and_capped() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(10));
        assert_eq!(p.delay_for(2), Duration::from_secs(20));
        assert_eq!(p.delay_for(3), Duration::from_secs(40));
        assert_eq!(p.delay_for(4), Duration::from_secs(60));
        assert_eq!(p.delay_for(50), Duration::from_secs(60));

        let mut last = Duration::ZERO;
        for n in 0..40 {
            let d = p.delay_for(n);
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn test_three_transient_failures_end_failed() {
        let mut task = BacklogTask::new("https://example.com", "Chez Test", TaskType::Text)
            .with_max_retries(3);
        let now = Utc::now();

        for attempt in 1..=3 {
            task.mark_processing(now);
            task.mark_failed("timeout", false, &policy(), now);
            assert_eq!(task.retry_count, attempt);
            assert!(task.retry_count <= task.max_retries);
            if attempt < 3 {
                assert_eq!(task.status, TaskStatus::Pending);
                assert!(task.next_attempt_at.is_some());
            }
        }

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(!task.can_retry());
        assert_eq!(task.error_messages.len(), 3);
        assert_eq!(task.last_error(), Some("timeout"));
    }

    #[test]
    fn test_permanent_failure_keeps_retry_count() {
        let mut task = BacklogTask::new("ftp://nope", "Nope", TaskType::Text);
        task.mark_processing(Utc::now());
        task.mark_failed("invalid url", true, &policy(), Utc::now());

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 0);
        assert!(task.next_attempt_at.is_none());
    }

    #[test]
    fn test_persistence_failure_does_not_touch_retry_count() {
        let mut task = BacklogTask::new("https://example.com", "Chez Test", TaskType::Text);
        task.mark_processing(Utc::now());
        task.mark_persistence_failed("database is locked", &policy(), Utc::now());

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.persistence_failures, 1);
        assert!(task.error_messages[0].contains("persistence: database is locked"));
    }

    #[test]
    fn test_default_task_id_format() {
        let at = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap();
        assert_eq!(
            BacklogTask::default_task_id(TaskType::Images, "Le Bistro", at),
            format!("images_Le Bistro_{}", at.timestamp())
        );
    }
}
