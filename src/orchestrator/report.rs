//! Run summaries and per-batch JSON reports.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backlog::ErrorClass;

/// Outcome of one attempted item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub name: String,
    pub url: String,
    pub restaurant_id: Option<i64>,
    /// Backlog task the item came from or was routed to.
    pub task_id: Option<String>,
    pub success: bool,
    pub unchanged: bool,
    pub translated: bool,
    pub quality_score: Option<f64>,
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub elapsed_secs: f64,
}

/// Totals for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    /// Skipped because the run was cancelled. Still re-runnable.
    pub not_attempted: usize,
    pub translated: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Mean wall time per attempted item.
    pub average_secs: f64,
    /// Percent of attempted items that succeeded.
    pub success_rate: f64,
    /// First errors, formatted `"<name>: <error>"`.
    pub errors: Vec<String>,
    pub items: Vec<ItemReport>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.not_attempted == 0
    }
}

/// Accumulates item reports into a [`RunSummary`].
#[derive(Debug)]
pub(crate) struct SummaryBuilder {
    run_id: String,
    total: usize,
    max_errors: usize,
    started_at: DateTime<Utc>,
    not_attempted: usize,
    cancelled: bool,
    errors: Vec<String>,
    items: Vec<ItemReport>,
}

impl SummaryBuilder {
    pub(crate) fn new(run_id: &str, total: usize, max_errors: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            total,
            max_errors,
            started_at: Utc::now(),
            not_attempted: 0,
            cancelled: false,
            errors: Vec::new(),
            items: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, item: ItemReport) {
        if let Some(error) = &item.error {
            if self.errors.len() < self.max_errors {
                self.errors.push(format!("{}: {}", item.name, error));
            }
        }
        self.items.push(item);
    }

    pub(crate) fn add_total(&mut self, count: usize) {
        self.total += count;
    }

    pub(crate) fn skip(&mut self, count: usize) {
        self.not_attempted += count;
        if count > 0 {
            self.cancelled = true;
        }
    }

    pub(crate) fn finish(self) -> RunSummary {
        let finished_at = Utc::now();
        let attempted = self.items.len();
        let successful = self.items.iter().filter(|i| i.success).count();
        let translated = self.items.iter().filter(|i| i.translated).count();
        let item_secs: f64 = self.items.iter().map(|i| i.elapsed_secs).sum();

        RunSummary {
            run_id: self.run_id,
            total: self.total,
            attempted,
            successful,
            failed: attempted - successful,
            not_attempted: self.not_attempted,
            translated,
            cancelled: self.cancelled,
            started_at: self.started_at,
            finished_at,
            elapsed_secs: (finished_at - self.started_at).num_milliseconds().max(0) as f64
                / 1000.0,
            average_secs: if attempted > 0 {
                item_secs / attempted as f64
            } else {
                0.0
            },
            success_rate: if attempted > 0 {
                successful as f64 * 100.0 / attempted as f64
            } else {
                0.0
            },
            errors: self.errors,
            items: self.items,
        }
    }
}

/// Per-batch report file contents.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<'a> {
    pub run_id: &'a str,
    pub batch: usize,
    pub written_at: DateTime<Utc>,
    pub successful: usize,
    pub failed: usize,
    pub items: &'a [ItemReport],
}

/// Write a batch report as pretty JSON. Returns the file path.
pub fn write_batch_report(dir: &Path, report: &BatchReport<'_>) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("batch_{}_{:03}.json", report.run_id, report.batch));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// Write the final summary next to the batch reports.
pub fn write_summary(dir: &Path, summary: &RunSummary) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("run_{}.json", summary.run_id));
    let json = serde_json::to_string_pretty(summary).map_err(std::io::Error::other)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(name: &str, error: Option<&str>, secs: f64) -> ItemReport {
        ItemReport {
            name: name.to_string(),
            url: format!("https://{}.test", name),
            restaurant_id: None,
            task_id: None,
            success: error.is_none(),
            unchanged: false,
            translated: name.starts_with('t'),
            quality_score: error.is_none().then_some(0.8),
            error: error.map(str::to_string),
            error_class: error.map(|_| ErrorClass::Transient),
            elapsed_secs: secs,
        }
    }

    #[test]
    fn test_summary_totals() {
        let mut b = SummaryBuilder::new("run", 5, 20);
        b.push(item("a", None, 1.0));
        b.push(item("tb", None, 3.0));
        b.push(item("c", Some("timeout"), 2.0));
        b.skip(2);
        let s = b.finish();

        assert_eq!(s.total, 5);
        assert_eq!(s.attempted, 3);
        assert_eq!(s.successful, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.not_attempted, 2);
        assert_eq!(s.translated, 1);
        assert!(s.cancelled);
        assert!((s.average_secs - 2.0).abs() < 1e-9);
        assert!((s.success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(s.errors, vec!["c: timeout"]);
        assert_eq!(s.total, s.attempted + s.not_attempted);
    }

    #[test]
    fn test_error_list_is_capped() {
        let mut b = SummaryBuilder::new("run", 30, 20);
        for i in 0..30 {
            b.push(item(&format!("r{}", i), Some("boom"), 0.1));
        }
        let s = b.finish();
        assert_eq!(s.errors.len(), 20);
        assert_eq!(s.errors[0], "r0: boom");
        assert_eq!(s.failed, 30);
    }

    #[test]
    fn test_empty_run() {
        let s = SummaryBuilder::new("run", 0, 20).finish();
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.average_secs, 0.0);
        assert!(s.is_clean());
    }

    #[test]
    fn test_reports_are_written_as_json() {
        let dir = tempdir().unwrap();
        let items = vec![item("a", None, 1.0)];
        let path = write_batch_report(
            dir.path(),
            &BatchReport {
                run_id: "abc",
                batch: 1,
                written_at: Utc::now(),
                successful: 1,
                failed: 0,
                items: &items,
            },
        )
        .unwrap();
        assert!(path.ends_with("batch_abc_001.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["items"][0]["name"], "a");
        assert_eq!(value["successful"], 1);
    }
}
