//! Batch orchestration over fresh targets and the backlog.
//!
//! Work is split into batches. Each batch runs on a bounded pool of tokio
//! tasks, then the orchestrator pauses before the next one. Cancellation
//! stops dispatch; in-flight attempts finish or hit their own timeout.

mod report;
mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backlog::{classify, BacklogScheduler};
use crate::models::{BacklogTask, TaskType};
use crate::pipeline::{AttemptError, AttemptOutcome, Enricher, Target};
use crate::repository::{RepositoryError, RestaurantRepository};

pub use report::{write_batch_report, write_summary, BatchReport, ItemReport, RunSummary};
pub use types::{OrchestratorConfig, RunEvent};
use report::SummaryBuilder;
use types::WorkItem;

async fn emit(events: &mpsc::Sender<RunEvent>, event: RunEvent) {
    let _ = events.send(event).await;
}

/// Resolves once cancellation is signalled. Never resolves if the sender
/// is gone without having cancelled.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Drives enrichment attempts in batches.
pub struct BatchOrchestrator {
    enricher: Arc<dyn Enricher>,
    scheduler: BacklogScheduler,
    restaurants: RestaurantRepository,
    config: OrchestratorConfig,
}

impl BatchOrchestrator {
    pub fn new(
        enricher: Arc<dyn Enricher>,
        scheduler: BacklogScheduler,
        restaurants: RestaurantRepository,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            enricher,
            scheduler,
            restaurants,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Enrich fresh targets. Failures are routed to the backlog.
    pub async fn run(
        &self,
        targets: Vec<Target>,
        mut cancel: watch::Receiver<bool>,
        events: mpsc::Sender<RunEvent>,
    ) -> RunSummary {
        let run_id = Uuid::new_v4().to_string();
        let batch_size = self.config.batch_size.max(1);
        let total = targets.len();
        let batches = total.div_ceil(batch_size);
        let mut summary = SummaryBuilder::new(&run_id, total, self.config.max_errors);

        info!("Run {}: {} target(s) in {} batch(es)", run_id, total, batches);
        emit(&events, RunEvent::RunStarted { total, batches }).await;

        let mut remaining = targets.into_iter().map(WorkItem::Fresh).peekable();
        let mut batch_no = 0;

        while remaining.peek().is_some() {
            if *cancel.borrow() {
                break;
            }
            batch_no += 1;
            let batch: Vec<WorkItem> = remaining.by_ref().take(batch_size).collect();
            self.run_batch(&run_id, batch_no, batches, batch, &cancel, &events, &mut summary)
                .await;

            if remaining.peek().is_some() && !self.pause(&mut cancel, &events).await {
                break;
            }
        }

        let left = remaining.count();
        if left > 0 {
            summary.skip(left);
            emit(&events, RunEvent::Cancelled { not_attempted: left }).await;
        }
        self.finish(summary, &events).await
    }

    /// Claim and process up to `max_tasks` backlog tasks.
    pub async fn run_backlog(
        &self,
        max_tasks: usize,
        task_type: Option<TaskType>,
        mut cancel: watch::Receiver<bool>,
        events: mpsc::Sender<RunEvent>,
    ) -> Result<RunSummary, RepositoryError> {
        let run_id = Uuid::new_v4().to_string();
        let batch_size = self.config.batch_size.max(1);
        let batches = max_tasks.div_ceil(batch_size);
        let mut summary = SummaryBuilder::new(&run_id, 0, self.config.max_errors);

        info!("Run {}: up to {} backlog task(s)", run_id, max_tasks);
        emit(&events, RunEvent::RunStarted { total: max_tasks, batches }).await;

        let mut claimed = 0;
        let mut batch_no = 0;

        while claimed < max_tasks {
            if *cancel.borrow() {
                break;
            }
            let limit = batch_size.min(max_tasks - claimed);
            let tasks = self.scheduler.claim_batch(limit, task_type)?;
            if tasks.is_empty() {
                break;
            }

            claimed += tasks.len();
            summary.add_total(tasks.len());
            batch_no += 1;
            let batch = tasks.into_iter().map(WorkItem::Task).collect();
            self.run_batch(&run_id, batch_no, batches, batch, &cancel, &events, &mut summary)
                .await;

            if claimed >= max_tasks || !self.scheduler.has_ready(task_type)? {
                break;
            }
            if !self.pause(&mut cancel, &events).await {
                break;
            }
        }

        Ok(self.finish(summary, &events).await)
    }

    /// Run one batch on the worker pool.
    #[allow(clippy::too_many_arguments)]
    async fn run_batch(
        &self,
        run_id: &str,
        batch_no: usize,
        batches: usize,
        items: Vec<WorkItem>,
        cancel: &watch::Receiver<bool>,
        events: &mpsc::Sender<RunEvent>,
        summary: &mut SummaryBuilder,
    ) {
        emit(
            events,
            RunEvent::BatchStarted {
                batch: batch_no,
                batches,
                size: items.len(),
            },
        )
        .await;

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, WorkItem> = HashMap::new();
        let mut pending = items.into_iter();
        let mut skipped = Vec::new();

        while let Some(item) = pending.next() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                skipped.push(item);
                break;
            };
            if *cancel.borrow() {
                skipped.push(item);
                break;
            }
            let worker = self.worker(events.clone());
            let spawned = item.clone();
            let handle = join_set.spawn(async move {
                let _permit = permit;
                worker.process(spawned).await
            });
            in_flight.insert(handle.id(), item);
        }
        skipped.extend(pending);

        let mut reports = Vec::new();
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((id, report)) => {
                    in_flight.remove(&id);
                    reports.push(report);
                }
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    let err = AttemptError::Crashed(e.to_string());
                    let report = match in_flight.remove(&e.id()) {
                        Some(item) => self.worker(events.clone()).record_failure(item, &err),
                        None => failure("<unknown>", "", None, None, &err),
                    };
                    emit(
                        events,
                        RunEvent::ItemFailed {
                            name: report.name.clone(),
                            error: err.to_string(),
                            class: classify(&err),
                        },
                    )
                    .await;
                    reports.push(report);
                }
            }
        }

        if !skipped.is_empty() {
            self.release(&mut skipped);
            summary.skip(skipped.len());
            emit(
                events,
                RunEvent::Cancelled {
                    not_attempted: skipped.len(),
                },
            )
            .await;
        }

        let successful = reports.iter().filter(|r| r.success).count();
        let failed = reports.len() - successful;
        info!(
            "Batch {}/{}: {} succeeded, {} failed",
            batch_no, batches, successful, failed
        );
        emit(
            events,
            RunEvent::BatchFinished {
                batch: batch_no,
                successful,
                failed,
            },
        )
        .await;

        if let Some(dir) = &self.config.report_dir {
            let report = BatchReport {
                run_id,
                batch: batch_no,
                written_at: Utc::now(),
                successful,
                failed,
                items: &reports,
            };
            match write_batch_report(dir, &report) {
                Ok(path) => info!("Wrote batch report {}", path.display()),
                Err(e) => warn!("Could not write batch report: {}", e),
            }
        }

        for report in reports {
            summary.push(report);
        }
    }

    /// Put claimed tasks that never ran back in the queue.
    fn release(&self, items: &mut [WorkItem]) {
        for item in items {
            if let WorkItem::Task(task) = item {
                if let Err(e) = self.scheduler.release(task) {
                    error!("Could not release task {}: {}", task.task_id, e);
                }
            }
        }
    }

    /// Sleep between batches. Returns false if cancelled meanwhile.
    async fn pause(&self, cancel: &mut watch::Receiver<bool>, events: &mpsc::Sender<RunEvent>) -> bool {
        if *cancel.borrow() {
            return false;
        }
        if self.config.pause.is_zero() {
            return true;
        }
        emit(
            events,
            RunEvent::Pausing {
                seconds: self.config.pause.as_secs(),
            },
        )
        .await;
        tokio::select! {
            _ = tokio::time::sleep(self.config.pause) => true,
            _ = cancelled(cancel) => false,
        }
    }

    async fn finish(&self, summary: SummaryBuilder, events: &mpsc::Sender<RunEvent>) -> RunSummary {
        let summary = summary.finish();
        info!(
            "Run {} finished: {}/{} succeeded ({:.1}%), {} failed, {} not attempted in {:.1}s",
            summary.run_id,
            summary.successful,
            summary.attempted,
            summary.success_rate,
            summary.failed,
            summary.not_attempted,
            summary.elapsed_secs
        );
        if let Some(dir) = &self.config.report_dir {
            if let Err(e) = write_summary(dir, &summary) {
                warn!("Could not write run summary: {}", e);
            }
        }
        emit(
            events,
            RunEvent::RunFinished {
                successful: summary.successful,
                failed: summary.failed,
                not_attempted: summary.not_attempted,
            },
        )
        .await;
        summary
    }

    fn worker(&self, events: mpsc::Sender<RunEvent>) -> Worker {
        Worker {
            enricher: self.enricher.clone(),
            scheduler: self.scheduler.clone(),
            restaurants: self.restaurants.clone(),
            task_type: self.config.task_type,
            item_timeout: self.config.item_timeout,
            events,
        }
    }
}

/// Everything one spawned attempt needs.
struct Worker {
    enricher: Arc<dyn Enricher>,
    scheduler: BacklogScheduler,
    restaurants: RestaurantRepository,
    task_type: TaskType,
    item_timeout: std::time::Duration,
    events: mpsc::Sender<RunEvent>,
}

impl Worker {
    async fn process(self, item: WorkItem) -> ItemReport {
        let started = Instant::now();
        emit(
            &self.events,
            RunEvent::ItemStarted {
                name: item.name().to_string(),
                url: item.url().to_string(),
            },
        )
        .await;

        let report = match item {
            WorkItem::Fresh(target) => self.process_fresh(target).await,
            WorkItem::Task(task) => self.process_task(task).await,
        };
        let report = ItemReport {
            elapsed_secs: started.elapsed().as_secs_f64(),
            ..report
        };

        let event = match &report.error {
            None => RunEvent::ItemSucceeded {
                name: report.name.clone(),
                quality_score: report.quality_score.unwrap_or(0.0),
                unchanged: report.unchanged,
            },
            Some(error) => RunEvent::ItemFailed {
                name: report.name.clone(),
                error: error.clone(),
                class: report.error_class.unwrap_or(crate::backlog::ErrorClass::Transient),
            },
        };
        emit(&self.events, event).await;
        report
    }

    async fn attempt(&self, target: &Target, task_type: TaskType) -> Result<AttemptOutcome, AttemptError> {
        match tokio::time::timeout(self.item_timeout, self.enricher.enrich(target, task_type)).await {
            Ok(result) => result,
            Err(_) => Err(AttemptError::Timeout(self.item_timeout.as_secs())),
        }
    }

    async fn process_fresh(&self, target: Target) -> ItemReport {
        match self.attempt(&target, self.task_type).await {
            Ok(outcome) => success(&target.name, &target.url, None, outcome),
            Err(err) => self.record_failure(WorkItem::Fresh(target), &err),
        }
    }

    async fn process_task(&self, mut task: BacklogTask) -> ItemReport {
        let result = match self.resolve(&task) {
            Ok(target) => self.attempt(&target, task.task_type).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(outcome) => {
                if let Err(e) = self.scheduler.complete(&mut task) {
                    error!("Could not mark task {} completed: {}", task.task_id, e);
                }
                success(
                    &task.restaurant_name,
                    &task.url,
                    Some(task.task_id.clone()),
                    outcome,
                )
            }
            Err(err) => self.record_failure(WorkItem::Task(task), &err),
        }
    }

    /// Route a failed attempt to the backlog. Also used when the worker
    /// itself died, so a claimed task does not stay in processing.
    fn record_failure(&self, item: WorkItem, err: &AttemptError) -> ItemReport {
        match item {
            WorkItem::Fresh(target) => {
                let task_id = match self.scheduler.record_fresh_failure(
                    &target.url,
                    &target.name,
                    self.task_type,
                    Some(target.restaurant_id),
                    err,
                ) {
                    Ok(task) => Some(task.task_id),
                    Err(e) => {
                        error!("Could not queue retry for {}: {}", target.name, e);
                        None
                    }
                };
                failure(&target.name, &target.url, Some(target.restaurant_id), task_id, err)
            }
            WorkItem::Task(mut task) => {
                if let Err(e) = self.scheduler.fail(&mut task, err) {
                    error!("Could not record failure for task {}: {}", task.task_id, e);
                }
                failure(
                    &task.restaurant_name,
                    &task.url,
                    task.restaurant_id,
                    Some(task.task_id.clone()),
                    err,
                )
            }
        }
    }

    /// Record a task's URL belongs to.
    fn resolve(&self, task: &BacklogTask) -> Result<Target, AttemptError> {
        if let Some(id) = task.restaurant_id {
            return Ok(Target::new(id, &task.restaurant_name, &task.url));
        }
        match self.restaurants.find_by_url(&task.url)? {
            Some(record) => Ok(Target::new(record.id, &record.name, &task.url)),
            None => Err(AttemptError::InvalidTarget(format!(
                "no restaurant record for {}",
                task.url
            ))),
        }
    }
}

fn success(name: &str, url: &str, task_id: Option<String>, outcome: AttemptOutcome) -> ItemReport {
    ItemReport {
        name: name.to_string(),
        url: url.to_string(),
        restaurant_id: Some(outcome.restaurant_id),
        task_id,
        success: true,
        unchanged: outcome.unchanged,
        translated: outcome.translated,
        quality_score: Some(outcome.quality_score),
        error: None,
        error_class: None,
        elapsed_secs: 0.0,
    }
}

fn failure(
    name: &str,
    url: &str,
    restaurant_id: Option<i64>,
    task_id: Option<String>,
    err: &AttemptError,
) -> ItemReport {
    let quality_score = match err {
        AttemptError::LowQuality { score } | AttemptError::Degraded { score, .. } => Some(*score),
        _ => None,
    };
    ItemReport {
        name: name.to_string(),
        url: url.to_string(),
        restaurant_id,
        task_id,
        success: false,
        unchanged: false,
        translated: false,
        quality_score,
        error: Some(err.to_string()),
        error_class: Some(classify(err)),
        elapsed_secs: 0.0,
    }
}
