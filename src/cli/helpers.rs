//! Shared helper functions for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::backlog::BacklogScheduler;
use crate::config::{PipelineConfig, Settings};
use crate::extraction::ExtractionEngine;
use crate::fetcher::{Fetcher, PageSource};
use crate::llm::{LlmClient, TokenBudget};
use crate::orchestrator::{BatchOrchestrator, RunEvent, RunSummary};
use crate::pipeline::EnrichmentPipeline;
use crate::repository::{BacklogRepository, RestaurantRepository};

/// Truncate a string for column display.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut)
}

/// Open the record store, failing with a hint when `init` has not run.
pub fn open_restaurants(settings: &Settings) -> anyhow::Result<RestaurantRepository> {
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run 'tablescout init' first.",
            settings.database_path().display()
        );
    }
    Ok(RestaurantRepository::new(&settings.database_path())?)
}

/// Open the backlog with the configured retry policy.
pub fn open_scheduler(config: &PipelineConfig) -> anyhow::Result<BacklogScheduler> {
    let settings = &config.settings;
    if !settings.database_exists() {
        anyhow::bail!(
            "No database at {}. Run 'tablescout init' first.",
            settings.database_path().display()
        );
    }
    let repo = BacklogRepository::new(&settings.database_path())?;
    Ok(BacklogScheduler::new(repo, config.backlog.clone()))
}

/// Wire the production pipeline together.
///
/// The fetcher is returned as well so the caller can close the browser once
/// the run is over.
pub async fn build_orchestrator(
    config: &PipelineConfig,
) -> anyhow::Result<(BatchOrchestrator, Arc<Fetcher>)> {
    let restaurants = open_restaurants(&config.settings)?;
    let scheduler = open_scheduler(config)?;

    let mut client = LlmClient::new(config.llm.clone())?;
    if !config.llm.budget.is_empty() {
        let budget = TokenBudget::new(config.llm.budget.clone())
            .with_state_file(&config.settings.budget_state_file);
        client = client.with_budget(Arc::new(budget));
    }
    if !client.is_available().await {
        println!(
            "{} Analysis service at {} is not reachable; attempts will be queued for retry",
            style("!").yellow(),
            config.llm.endpoint
        );
    }

    let engine = ExtractionEngine::new(Arc::new(client))
        .with_target_language(&config.settings.target_language)
        .with_max_images(config.pipeline.max_images);

    let fetcher = Arc::new(Fetcher::new(config.fetcher.clone())?);
    let source: Arc<dyn PageSource> = fetcher.clone();
    let pipeline = EnrichmentPipeline::new(
        source,
        engine,
        restaurants.clone(),
        config.pipeline.clone(),
    );

    let orchestrator = BatchOrchestrator::new(
        Arc::new(pipeline),
        scheduler,
        restaurants,
        config.orchestrator.clone(),
    );
    Ok((orchestrator, fetcher))
}

/// Cancellation signal flipped by Ctrl-C.
pub fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Stopping after in-flight attempts finish...",
                style("!").yellow()
            );
            let _ = tx.send(true);
        }
    });
    rx
}

/// Render run events on a progress bar until the sender is dropped.
pub fn spawn_progress(mut events: mpsc::Receiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("#>-"));
        }
        pb.enable_steady_tick(Duration::from_millis(200));

        while let Some(event) = events.recv().await {
            match event {
                RunEvent::RunStarted { total, .. } => pb.set_length(total as u64),
                RunEvent::BatchStarted {
                    batch,
                    batches,
                    size,
                } => pb.set_message(format!("batch {}/{} ({} targets)", batch, batches, size)),
                RunEvent::ItemStarted { name, .. } => pb.set_message(truncate(&name, 40)),
                RunEvent::ItemSucceeded {
                    name,
                    quality_score,
                    unchanged,
                } => {
                    pb.inc(1);
                    if unchanged {
                        pb.println(format!("  {} {} (unchanged)", style("=").dim(), name));
                    } else {
                        pb.println(format!(
                            "  {} {} ({:.2})",
                            style("✓").green(),
                            name,
                            quality_score
                        ));
                    }
                }
                RunEvent::ItemFailed { name, error, class } => {
                    pb.inc(1);
                    pb.println(format!(
                        "  {} {} [{}]: {}",
                        style("✗").red(),
                        name,
                        class.as_str(),
                        truncate(&error, 100)
                    ));
                }
                RunEvent::BatchFinished {
                    batch,
                    successful,
                    failed,
                } => pb.println(format!(
                    "{} Batch {} done: {} ok, {} failed",
                    style("→").cyan(),
                    batch,
                    successful,
                    failed
                )),
                RunEvent::Pausing { seconds } => {
                    pb.set_message(format!("pausing {}s before next batch", seconds))
                }
                RunEvent::Cancelled { not_attempted } => pb.println(format!(
                    "{} Cancelled, {} target(s) left for the next run",
                    style("!").yellow(),
                    not_attempted
                )),
                RunEvent::RunFinished { .. } => pb.finish_and_clear(),
            }
        }
        pb.finish_and_clear();
    })
}

/// Print a run summary.
pub fn print_summary(summary: &RunSummary) {
    println!("\n{}", style("Run summary").bold());
    println!("{}", "-".repeat(50));
    println!("  Run:            {}", summary.run_id);
    println!("  Attempted:      {}/{}", summary.attempted, summary.total);
    println!("  Successful:     {}", style(summary.successful).green());
    println!("  Failed:         {}", style(summary.failed).red());
    if summary.not_attempted > 0 {
        println!("  Not attempted:  {}", style(summary.not_attempted).yellow());
    }
    println!("  Translated:     {}", summary.translated);
    println!("  Success rate:   {:.1}%", summary.success_rate);
    println!(
        "  Elapsed:        {:.1}s ({:.1}s per attempt)",
        summary.elapsed_secs, summary.average_secs
    );

    if !summary.errors.is_empty() {
        println!("\n{}", style("Errors").bold());
        for error in &summary.errors {
            println!("  {} {}", style("✗").red(), truncate(error, 120));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Le Bernardin", 6), "Le Be…");
        assert_eq!(truncate("Café Müller", 5).chars().count(), 5);
    }
}
