//! Backlog management commands.

use std::time::Duration;

use console::style;

use crate::cli::helpers::{open_restaurants, open_scheduler, truncate};
use crate::config::PipelineConfig;
use crate::models::{TaskStatus, TaskType};

/// Queue a URL, or a stored record's website, for enrichment.
pub fn cmd_backlog_enqueue(
    config: &PipelineConfig,
    url: Option<&str>,
    name: Option<&str>,
    restaurant_id: Option<i64>,
    task_type: TaskType,
    priority: Option<i32>,
) -> anyhow::Result<()> {
    let scheduler = open_scheduler(config)?;

    let record = match restaurant_id {
        Some(id) => Some(
            open_restaurants(&config.settings)?
                .get(id)?
                .ok_or_else(|| anyhow::anyhow!("Restaurant {} not found", id))?,
        ),
        None => None,
    };

    let url = url
        .map(str::to_string)
        .or_else(|| record.as_ref().and_then(|r| r.target_url().map(str::to_string)))
        .ok_or_else(|| anyhow::anyhow!("Give a URL or a restaurant id with a website"))?;
    let name = name
        .map(str::to_string)
        .or_else(|| record.as_ref().map(|r| r.name.clone()))
        .unwrap_or_else(|| url.clone());

    match scheduler.enqueue_url(&url, &name, task_type, restaurant_id, priority)? {
        Some(task) => println!(
            "{} Queued {} task {} for {}",
            style("✓").green(),
            task_type.as_str(),
            task.task_id,
            url
        ),
        None => println!(
            "{} {} already has an active {} task",
            style("!").yellow(),
            url,
            task_type.as_str()
        ),
    }
    Ok(())
}

/// Show backlog counts.
pub fn cmd_backlog_stats(config: &PipelineConfig, json: bool) -> anyhow::Result<()> {
    let stats = open_scheduler(config)?.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("\n{}", style("Backlog").bold());
    println!("{}", "-".repeat(40));
    println!("  Total:            {}", stats.total);
    println!("  Pending:          {}", stats.pending);
    println!("  Processing:       {}", stats.processing);
    println!("  Completed:        {}", style(stats.completed).green());
    println!("  Failed:           {}", style(stats.failed).red());
    println!("  Awaiting retry:   {}", stats.retries_pending);

    if !stats.by_type.is_empty() {
        let mut by_type: Vec<_> = stats.by_type.iter().collect();
        by_type.sort();
        println!("\n  By type:");
        for (task_type, count) in by_type {
            println!("    {:<16} {}", task_type, count);
        }
    }
    Ok(())
}

/// List tasks in dequeue order.
pub fn cmd_backlog_list(
    config: &PipelineConfig,
    status: Option<TaskStatus>,
    task_type: Option<TaskType>,
    limit: usize,
) -> anyhow::Result<()> {
    let tasks = open_scheduler(config)?.list(status, task_type, limit)?;

    if tasks.is_empty() {
        println!("{} No tasks found", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:<4} {:<11} {:<13} {:<7} {:<26} Last error",
        "Pri", "Status", "Type", "Tries", "Restaurant"
    );
    println!("{}", "-".repeat(100));
    for task in &tasks {
        let status = match task.status {
            TaskStatus::Completed => style(task.status.as_str()).green(),
            TaskStatus::Failed => style(task.status.as_str()).red(),
            TaskStatus::Processing => style(task.status.as_str()).cyan(),
            TaskStatus::Pending => style(task.status.as_str()),
        };
        println!(
            "{:<4} {:<11} {:<13} {:<7} {:<26} {}",
            task.priority,
            status,
            task.task_type.as_str(),
            format!("{}/{}", task.retry_count, task.max_retries),
            truncate(&task.restaurant_name, 25),
            truncate(task.last_error().unwrap_or("-"), 40)
        );
    }
    Ok(())
}

/// Return tasks stuck in processing to pending.
pub fn cmd_backlog_reset_stale(config: &PipelineConfig, minutes: u64) -> anyhow::Result<()> {
    let count = open_scheduler(config)?.reset_stale(Duration::from_secs(minutes * 60))?;
    println!(
        "{} Reset {} stale task(s) to pending",
        style("✓").green(),
        count
    );
    Ok(())
}

/// Give failed tasks a fresh set of retries.
pub fn cmd_backlog_retry_failed(
    config: &PipelineConfig,
    task_type: Option<TaskType>,
) -> anyhow::Result<()> {
    let count = open_scheduler(config)?.retry_failed(task_type)?;
    println!("{} Requeued {} failed task(s)", style("✓").green(), count);
    Ok(())
}
