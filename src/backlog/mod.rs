//! Backlog scheduling: the task lifecycle on top of the backlog store.
//!
//! The repository owns atomic claims and row storage; this layer decides
//! what a failure means for a task and which transition to apply.

mod classify;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{BacklogStats, BacklogTask, RetryPolicy, TaskStatus, TaskType};
use crate::pipeline::AttemptError;
use crate::repository::{BacklogRepository, RepositoryError, Result};

pub use classify::{classify, ErrorClass};

const ID_ATTEMPTS: usize = 4;

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct BacklogConfig {
    pub retry: RetryPolicy,
    pub max_retries: u32,
    pub default_priority: i32,
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_retries: 3,
            default_priority: 1,
        }
    }
}

/// Applies lifecycle transitions to backlog tasks.
#[derive(Debug, Clone)]
pub struct BacklogScheduler {
    repo: BacklogRepository,
    config: BacklogConfig,
}

impl BacklogScheduler {
    pub fn new(repo: BacklogRepository, config: BacklogConfig) -> Self {
        Self { repo, config }
    }

    pub fn repository(&self) -> &BacklogRepository {
        &self.repo
    }

    pub fn config(&self) -> &BacklogConfig {
        &self.config
    }

    /// Build a pending task with the configured defaults.
    pub fn new_task(
        &self,
        url: &str,
        restaurant_name: &str,
        task_type: TaskType,
        restaurant_id: Option<i64>,
    ) -> BacklogTask {
        let mut task = BacklogTask::new(url, restaurant_name, task_type)
            .with_priority(self.config.default_priority)
            .with_max_retries(self.config.max_retries);
        task.restaurant_id = restaurant_id;
        task
    }

    /// Add a task. Returns false when its id is already taken.
    pub fn enqueue(&self, task: &BacklogTask) -> Result<bool> {
        let inserted = self.repo.enqueue(task)?;
        if inserted {
            info!(
                "Queued {} task {} for {}",
                task.task_type.as_str(),
                task.task_id,
                task.restaurant_name
            );
        } else {
            debug!("Task {} already queued", task.task_id);
        }
        Ok(inserted)
    }

    /// Queue work for a URL unless an active task for it already exists.
    pub fn enqueue_url(
        &self,
        url: &str,
        restaurant_name: &str,
        task_type: TaskType,
        restaurant_id: Option<i64>,
        priority: Option<i32>,
    ) -> Result<Option<BacklogTask>> {
        if self.repo.find_active(url, task_type)?.is_some() {
            debug!("{} already has an active {} task", url, task_type.as_str());
            return Ok(None);
        }
        let mut task = self.new_task(url, restaurant_name, task_type, restaurant_id);
        if let Some(priority) = priority {
            task.priority = priority;
        }
        self.insert_new(&mut task)?;
        Ok(Some(task))
    }

    /// Insert a task built by this scheduler. The default id only has
    /// second resolution, so a taken id gets a random suffix instead of
    /// silently dropping the task.
    fn insert_new(&self, task: &mut BacklogTask) -> Result<()> {
        let base = task.task_id.clone();
        for _ in 0..ID_ATTEMPTS {
            if self.enqueue(task)? {
                return Ok(());
            }
            let suffix = Uuid::new_v4().simple().to_string();
            task.task_id = format!("{}_{}", base, &suffix[..8]);
        }
        Err(RepositoryError::Conflict(format!(
            "no free task id for {}",
            base
        )))
    }

    pub fn claim_next(&self, task_type: Option<TaskType>) -> Result<Option<BacklogTask>> {
        self.repo.claim_next(task_type, Utc::now())
    }

    pub fn claim_batch(&self, limit: usize, task_type: Option<TaskType>) -> Result<Vec<BacklogTask>> {
        self.repo.claim_batch(limit, task_type, Utc::now())
    }

    /// Mark a claimed task completed.
    pub fn complete(&self, task: &mut BacklogTask) -> Result<()> {
        task.mark_completed(Utc::now());
        self.repo.update(task)?;
        debug!("Task {} completed", task.task_id);
        Ok(())
    }

    /// Apply a failed attempt to a claimed task. Returns the failure class.
    pub fn fail(&self, task: &mut BacklogTask, err: &AttemptError) -> Result<ErrorClass> {
        self.fail_at(task, err, Utc::now())
    }

    pub fn fail_at(
        &self,
        task: &mut BacklogTask,
        err: &AttemptError,
        now: DateTime<Utc>,
    ) -> Result<ErrorClass> {
        let class = classify(err);
        let message = err.to_string();

        match class {
            ErrorClass::Persistence => {
                task.mark_persistence_failed(&message, &self.config.retry, now)
            }
            ErrorClass::Permanent => task.mark_failed(&message, true, &self.config.retry, now),
            ErrorClass::Transient | ErrorClass::Degraded => {
                task.mark_failed(&message, false, &self.config.retry, now)
            }
        }

        self.repo.update(task)?;
        log_transition(task, class, &message);
        Ok(class)
    }

    /// Record a failure from a fresh (non-backlog) attempt.
    ///
    /// A pending task for the same URL and type takes the failure as a
    /// consumed retry. A task another worker is processing gets the error
    /// appended and keeps its state, since that worker decides the
    /// transition. Otherwise a new task is created carrying the error.
    pub fn record_fresh_failure(
        &self,
        url: &str,
        restaurant_name: &str,
        task_type: TaskType,
        restaurant_id: Option<i64>,
        err: &AttemptError,
    ) -> Result<BacklogTask> {
        let now = Utc::now();

        if let Some(mut existing) = self.repo.find_active(url, task_type)? {
            if existing.status == TaskStatus::Pending {
                self.fail_at(&mut existing, err, now)?;
                return Ok(existing);
            }
            let entry = existing.note_error(&err.to_string(), now);
            if self.repo.append_error(&existing.task_id, &entry)? {
                info!(
                    "Task {} is in progress elsewhere; recorded error: {}",
                    existing.task_id, err
                );
                return Ok(existing);
            }
        }

        let class = classify(err);
        let message = err.to_string();
        let mut task = self.new_task(url, restaurant_name, task_type, restaurant_id);
        task.note_initial_failure(&message, class.is_permanent(), &self.config.retry, now);
        self.insert_new(&mut task)?;
        log_transition(&task, class, &message);
        Ok(task)
    }

    /// Hand a claimed but unattempted task back to the queue untouched.
    pub fn release(&self, task: &mut BacklogTask) -> Result<()> {
        task.status = TaskStatus::Pending;
        self.repo.update(task)?;
        debug!("Released task {}", task.task_id);
        Ok(())
    }

    /// Whether anything is claimable right now.
    pub fn has_ready(&self, task_type: Option<TaskType>) -> Result<bool> {
        let ready = self.repo.get_pending(256, Utc::now())?;
        Ok(ready
            .iter()
            .any(|t| task_type.map_or(true, |ty| t.task_type == ty)))
    }

    pub fn get(&self, task_id: &str) -> Result<Option<BacklogTask>> {
        self.repo.get(task_id)
    }

    pub fn list(
        &self,
        status: Option<TaskStatus>,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> Result<Vec<BacklogTask>> {
        self.repo.list(status, task_type, limit)
    }

    pub fn stats(&self) -> Result<BacklogStats> {
        self.repo.stats()
    }

    /// Return tasks claimed longer ago than `older_than` to pending.
    pub fn reset_stale(&self, older_than: Duration) -> Result<usize> {
        let age = chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::hours(1));
        let count = self.repo.reset_stale(Utc::now() - age)?;
        if count > 0 {
            warn!("Reset {} stale processing task(s) to pending", count);
        }
        Ok(count)
    }

    /// Give every failed task (optionally of one type) a fresh set of retries.
    pub fn retry_failed(&self, task_type: Option<TaskType>) -> Result<usize> {
        let count = self.repo.requeue_failed(task_type)?;
        info!("Requeued {} failed task(s)", count);
        Ok(count)
    }
}

fn log_transition(task: &BacklogTask, class: ErrorClass, message: &str) {
    match task.status {
        TaskStatus::Failed => warn!(
            "Task {} failed ({}): {}",
            task.task_id,
            class.as_str(),
            message
        ),
        _ => info!(
            "Task {} will retry ({}, attempt {}/{}): {}",
            task.task_id,
            class.as_str(),
            task.retry_count,
            task.max_retries,
            message
        ),
    }
}
