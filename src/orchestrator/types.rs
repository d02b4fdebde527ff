//! Orchestrator configuration, work items and progress events.

use std::path::PathBuf;
use std::time::Duration;

use crate::backlog::ErrorClass;
use crate::models::{BacklogTask, TaskType};
use crate::pipeline::Target;

/// Batch run settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub batch_size: usize,
    pub workers: usize,
    /// Sleep between batches; skipped after the last one.
    pub pause: Duration,
    pub item_timeout: Duration,
    /// How many error messages the run summary keeps.
    pub max_errors: usize,
    /// Task type for fresh targets.
    pub task_type: TaskType,
    /// Write per-batch JSON reports here when set.
    pub report_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            workers: 10,
            pause: Duration::from_secs(30),
            item_timeout: Duration::from_secs(300),
            max_errors: 20,
            task_type: TaskType::Text,
            report_dir: None,
        }
    }
}

/// One unit of orchestrator work.
#[derive(Debug, Clone)]
pub(crate) enum WorkItem {
    /// A record that has never been (successfully) enriched.
    Fresh(Target),
    /// A claimed backlog task.
    Task(BacklogTask),
}

impl WorkItem {
    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Fresh(t) => &t.name,
            Self::Task(t) => &t.restaurant_name,
        }
    }

    pub(crate) fn url(&self) -> &str {
        match self {
            Self::Fresh(t) => &t.url,
            Self::Task(t) => &t.url,
        }
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        total: usize,
        batches: usize,
    },
    BatchStarted {
        batch: usize,
        batches: usize,
        size: usize,
    },
    ItemStarted {
        name: String,
        url: String,
    },
    ItemSucceeded {
        name: String,
        quality_score: f64,
        unchanged: bool,
    },
    ItemFailed {
        name: String,
        error: String,
        class: ErrorClass,
    },
    BatchFinished {
        batch: usize,
        successful: usize,
        failed: usize,
    },
    Pausing {
        seconds: u64,
    },
    Cancelled {
        not_attempted: usize,
    },
    RunFinished {
        successful: usize,
        failed: usize,
        not_attempted: usize,
    },
}
