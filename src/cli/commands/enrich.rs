//! Enrichment runs over fresh targets and the backlog.

use console::style;
use tokio::sync::mpsc;

use crate::cli::helpers::{
    build_orchestrator, cancel_on_ctrl_c, open_restaurants, print_summary, spawn_progress,
};
use crate::config::PipelineConfig;
use crate::models::TaskType;
use crate::orchestrator::RunSummary;
use crate::pipeline::Target;

const EVENT_BUFFER: usize = 256;

/// Enrich records that have not been enriched yet, then optionally the backlog.
pub async fn cmd_enrich(config: &PipelineConfig, limit: usize, with_backlog: bool) -> anyhow::Result<()> {
    let restaurants = open_restaurants(&config.settings)?;
    let limit = if limit == 0 { usize::MAX } else { limit };
    let targets: Vec<Target> = restaurants
        .list_needing_enrichment(limit)?
        .iter()
        .filter_map(Target::from_restaurant)
        .collect();

    if targets.is_empty() && !with_backlog {
        println!("{} Nothing to enrich", style("!").yellow());
        return Ok(());
    }

    let (orchestrator, fetcher) = build_orchestrator(config).await?;
    let cancel = cancel_on_ctrl_c();

    if !targets.is_empty() {
        println!(
            "{} Enriching {} record(s) with {} worker(s)",
            style("→").cyan(),
            targets.len(),
            orchestrator.config().workers
        );
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let progress = spawn_progress(rx);
        let summary = orchestrator.run(targets, cancel.clone(), tx).await;
        let _ = progress.await;
        print_summary(&summary);
        if summary.cancelled {
            fetcher.close().await;
            return Ok(());
        }
    }

    if with_backlog {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let progress = spawn_progress(rx);
        let summary = orchestrator
            .run_backlog(config.backlog_max_tasks, None, cancel, tx)
            .await;
        let _ = progress.await;
        report_backlog(summary)?;
    }

    fetcher.close().await;
    Ok(())
}

/// Process ready backlog tasks.
pub async fn cmd_backlog_process(
    config: &PipelineConfig,
    max_tasks: usize,
    task_type: Option<TaskType>,
) -> anyhow::Result<()> {
    let (orchestrator, fetcher) = build_orchestrator(config).await?;
    let cancel = cancel_on_ctrl_c();

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let progress = spawn_progress(rx);
    let summary = orchestrator
        .run_backlog(max_tasks, task_type, cancel, tx)
        .await;
    let _ = progress.await;
    fetcher.close().await;

    report_backlog(summary)
}

fn report_backlog(
    summary: Result<RunSummary, crate::repository::RepositoryError>,
) -> anyhow::Result<()> {
    let summary = summary?;
    if summary.attempted == 0 && summary.not_attempted == 0 {
        println!("{} No backlog tasks are ready", style("!").yellow());
        return Ok(());
    }
    print_summary(&summary);
    Ok(())
}
