//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod backlog;
mod enrich;
mod init;
mod show;
mod targets;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, PipelineConfig};
use crate::fetcher::FetchStrategy;
use crate::models::{TaskStatus, TaskType};

#[derive(Parser)]
#[command(name = "tablescout")]
#[command(about = "Restaurant website enrichment pipeline")]
#[command(version)]
pub struct Cli {
    /// Target directory or database file (overrides config file).
    /// Can be a directory containing tablescout.db or a .db file directly.
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Overrides for a batch run.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Targets per batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Concurrent attempts per batch
    #[arg(short, long)]
    workers: Option<usize>,
    /// Seconds to pause between batches
    #[arg(long)]
    pause: Option<u64>,
    /// Per-target timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// What to extract
    #[arg(long, value_enum)]
    task_type: Option<TaskType>,
    /// How to fetch pages
    #[arg(long, value_enum)]
    strategy: Option<FetchStrategy>,
    /// Re-extract even when the page is unchanged and overwrite set-once fields
    #[arg(long)]
    force: bool,
    /// Write per-batch JSON reports
    #[arg(long)]
    reports: bool,
}

impl RunArgs {
    /// Fold command-line overrides into the loaded configuration.
    fn apply(&self, config: &mut PipelineConfig) {
        let orch = &mut config.orchestrator;
        if let Some(n) = self.batch_size {
            orch.batch_size = n;
        }
        if let Some(n) = self.workers {
            orch.workers = n;
        }
        if let Some(secs) = self.pause {
            orch.pause = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = self.timeout {
            orch.item_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(task_type) = self.task_type {
            orch.task_type = task_type;
        }
        if self.reports {
            orch.report_dir = Some(config.settings.reports_dir.clone());
        }
        if let Some(strategy) = self.strategy {
            config.pipeline.strategy = strategy;
        }
        config.pipeline.force = self.force;
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Manage restaurant records
    Targets {
        #[command(subcommand)]
        command: TargetCommands,
    },

    /// Enrich records that have not been enriched yet
    Enrich {
        /// Maximum records to attempt (0 = all)
        #[arg(short, long, default_value = "0")]
        limit: usize,
        /// Work through the backlog after the fresh targets
        #[arg(long)]
        backlog: bool,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Manage the retry backlog
    Backlog {
        #[command(subcommand)]
        command: BacklogCommands,
    },

    /// Show a restaurant profile
    Show {
        /// Restaurant id
        id: i64,
        /// Output the raw record as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Add or update a restaurant record
    Add {
        /// Restaurant name
        name: String,
        /// Website URL
        #[arg(short, long)]
        url: Option<String>,
        /// Location as "City, Region, Country"
        #[arg(short = 'L', long)]
        location: Option<String>,
        /// Award text such as "2 Stars"
        #[arg(long)]
        award: Option<String>,
        /// Cuisine
        #[arg(long)]
        cuisine: Option<String>,
        /// Price text such as "€€€"
        #[arg(long)]
        price: Option<String>,
        /// Phone number
        #[arg(long)]
        phone: Option<String>,
    },
    /// List restaurant records
    List {
        /// Maximum records to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Only records still waiting for enrichment
        #[arg(long)]
        pending: bool,
    },
}

#[derive(Subcommand)]
enum BacklogCommands {
    /// Queue a URL (or a stored record) for enrichment
    Enqueue {
        /// URL to enrich
        url: Option<String>,
        /// Restaurant name for the task
        #[arg(short, long)]
        name: Option<String>,
        /// Restaurant id; its website is used when no URL is given
        #[arg(short, long)]
        restaurant: Option<i64>,
        /// What to extract
        #[arg(long, value_enum, default_value = "text")]
        task_type: TaskType,
        /// Higher runs first
        #[arg(short, long)]
        priority: Option<i32>,
    },
    /// Process ready backlog tasks
    Process {
        /// Maximum tasks to claim
        #[arg(short, long)]
        max_tasks: Option<usize>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show backlog counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List backlog tasks in dequeue order
    List {
        #[arg(long, value_enum)]
        status: Option<TaskStatus>,
        #[arg(long, value_enum)]
        task_type: Option<TaskType>,
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Return tasks stuck in processing to pending
    ResetStale {
        /// Claimed longer ago than this many minutes
        #[arg(long, default_value = "60")]
        minutes: u64,
    },
    /// Give failed tasks a fresh set of retries
    RetryFailed {
        #[arg(long, value_enum)]
        task_type: Option<TaskType>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.target,
    };
    let (settings, config) = load_settings_with_options(options).await;
    let mut pipeline_config = PipelineConfig::new(settings, &config);

    match cli.command {
        Commands::Init => init::cmd_init(&pipeline_config.settings).await,
        Commands::Targets { command } => match command {
            TargetCommands::Add {
                name,
                url,
                location,
                award,
                cuisine,
                price,
                phone,
            } => targets::cmd_targets_add(
                &pipeline_config.settings,
                targets::TargetInput {
                    name,
                    url,
                    location,
                    award,
                    cuisine,
                    price,
                    phone,
                },
            ),
            TargetCommands::List { limit, pending } => {
                targets::cmd_targets_list(&pipeline_config.settings, limit, pending)
            }
        },
        Commands::Enrich {
            limit,
            backlog,
            run,
        } => {
            run.apply(&mut pipeline_config);
            enrich::cmd_enrich(&pipeline_config, limit, backlog).await
        }
        Commands::Backlog { command } => match command {
            BacklogCommands::Enqueue {
                url,
                name,
                restaurant,
                task_type,
                priority,
            } => backlog::cmd_backlog_enqueue(
                &pipeline_config,
                url.as_deref(),
                name.as_deref(),
                restaurant,
                task_type,
                priority,
            ),
            BacklogCommands::Process { max_tasks, run } => {
                run.apply(&mut pipeline_config);
                let max_tasks = max_tasks.unwrap_or(pipeline_config.backlog_max_tasks);
                let task_type = run.task_type;
                enrich::cmd_backlog_process(&pipeline_config, max_tasks, task_type).await
            }
            BacklogCommands::Stats { json } => backlog::cmd_backlog_stats(&pipeline_config, json),
            BacklogCommands::List {
                status,
                task_type,
                limit,
            } => backlog::cmd_backlog_list(&pipeline_config, status, task_type, limit),
            BacklogCommands::ResetStale { minutes } => {
                backlog::cmd_backlog_reset_stale(&pipeline_config, minutes)
            }
            BacklogCommands::RetryFailed { task_type } => {
                backlog::cmd_backlog_retry_failed(&pipeline_config, task_type)
            }
        },
        Commands::Show { id, json } => show::cmd_show(&pipeline_config.settings, id, json),
    }
}
