//! Configuration management for tablescout using the prefer crate.
//!
//! `Config` is the file model (every field optional), `Settings` the
//! resolved runtime paths and network knobs, and `PipelineConfig` the
//! aggregate handed to the pipeline once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backlog::BacklogConfig;
use crate::fetcher::{BrowserEngineConfig, FetchStrategy, FetcherConfig, RateLimitConfig};
use crate::llm::LlmConfig;
use crate::models::{RetryPolicy, TaskType};
use crate::orchestrator::OrchestratorConfig;
use crate::pipeline::PipelineOptions;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "tablescout.db";

const REPORTS_SUBDIR: &str = "reports";
const BUDGET_STATE_FILENAME: &str = "token_budget.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    pub database_filename: String,
    /// Where batch reports go when enabled.
    pub reports_dir: PathBuf,
    /// Persisted token usage for the daily budget.
    pub budget_state_file: PathBuf,
    /// None, "impersonate", or a literal agent string.
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay after every request in milliseconds.
    pub request_delay_ms: u64,
    /// Base per-origin delay in milliseconds.
    pub rate_limit_delay_ms: u64,
    pub respect_robots: bool,
    /// Language analysis runs in.
    pub target_language: String,
}

impl Default for Settings {
    fn default() -> Self {
        // Documents dir -> Home dir -> Current dir
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tablescout");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings rooted at a data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            reports_dir: data_dir.join(REPORTS_SUBDIR),
            budget_state_file: data_dir.join(BUDGET_STATE_FILENAME),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 0,
            rate_limit_delay_ms: 2000,
            respect_robots: true,
            target_language: "en".to_string(),
        }
    }

    /// Full path to the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub strategy: Option<FetchStrategy>,
    /// Below this much visible text, auto mode retries in the browser.
    pub min_content_chars: Option<usize>,
    /// Hosts that need the browser from the start.
    pub browser_domains: Vec<String>,
    pub max_subpages: Option<usize>,
    pub max_images: Option<usize>,
}

/// `[batch]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub pause_secs: Option<u64>,
    pub item_timeout_secs: Option<u64>,
    pub max_errors: Option<usize>,
    pub task_type: Option<TaskType>,
    /// Write per-batch JSON reports.
    pub write_reports: bool,
}

/// `[backlog]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacklogSection {
    pub max_retries: Option<u32>,
    pub retry_base_secs: Option<u64>,
    pub retry_multiplier: Option<f64>,
    pub retry_max_secs: Option<u64>,
    /// Tasks processed per backlog run.
    pub max_tasks: Option<usize>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reports_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay after every request in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Base per-origin delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respect_robots: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub backlog: BacklogSection,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers tablescout config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("tablescout").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}; using defaults", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// TOML, YAML or JSON by file extension; JSON when there is none.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        config.llm = config.llm.with_env_overrides();
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
        }
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            *settings = Settings {
                database_filename: settings.database_filename.clone(),
                ..Settings::with_data_dir(self.resolve_path(data_dir, base_dir))
            };
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref reports_dir) = self.reports_dir {
            settings.reports_dir = self.resolve_path(reports_dir, base_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(delay) = self.rate_limit_delay_ms {
            settings.rate_limit_delay_ms = delay;
        }
        if let Some(respect) = self.respect_robots {
            settings.respect_robots = respect;
        }
        if let Some(ref lang) = self.target_language {
            settings.target_language = lang.to_lowercase();
        }
    }
}

/// Everything the pipeline needs, built once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub settings: Settings,
    pub fetcher: FetcherConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineOptions,
    pub orchestrator: OrchestratorConfig,
    pub backlog: BacklogConfig,
    /// Tasks per backlog run.
    pub backlog_max_tasks: usize,
}

impl PipelineConfig {
    pub fn new(settings: Settings, config: &Config) -> Self {
        let fetch = &config.fetch;
        let fetch_defaults = FetcherConfig::default();
        let pipeline_defaults = PipelineOptions::default();

        let fetcher = FetcherConfig {
            timeout: Duration::from_secs(settings.request_timeout),
            request_delay: Duration::from_millis(settings.request_delay_ms),
            user_agent: settings.user_agent.clone(),
            respect_robots: settings.respect_robots,
            min_content_chars: fetch
                .min_content_chars
                .unwrap_or(fetch_defaults.min_content_chars),
            browser_domains: fetch.browser_domains.clone(),
            browser: config.browser.clone(),
            rate_limit: RateLimitConfig::default()
                .with_base_delay(Duration::from_millis(settings.rate_limit_delay_ms)),
        };

        let pipeline = PipelineOptions {
            strategy: fetch.strategy.unwrap_or(pipeline_defaults.strategy),
            max_subpages: fetch.max_subpages.unwrap_or(pipeline_defaults.max_subpages),
            max_images: fetch.max_images.unwrap_or(pipeline_defaults.max_images),
            force: false,
        };

        let batch = &config.batch;
        let orchestrator_defaults = OrchestratorConfig::default();
        let orchestrator = OrchestratorConfig {
            batch_size: batch.batch_size.unwrap_or(orchestrator_defaults.batch_size),
            workers: batch.workers.unwrap_or(orchestrator_defaults.workers),
            pause: batch
                .pause_secs
                .map(Duration::from_secs)
                .unwrap_or(orchestrator_defaults.pause),
            item_timeout: batch
                .item_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(orchestrator_defaults.item_timeout),
            max_errors: batch.max_errors.unwrap_or(orchestrator_defaults.max_errors),
            task_type: batch.task_type.unwrap_or(orchestrator_defaults.task_type),
            report_dir: batch.write_reports.then(|| settings.reports_dir.clone()),
        };

        let section = &config.backlog;
        let retry_defaults = RetryPolicy::default();
        let backlog = BacklogConfig {
            retry: RetryPolicy {
                base_delay: section
                    .retry_base_secs
                    .map(Duration::from_secs)
                    .unwrap_or(retry_defaults.base_delay),
                multiplier: section.retry_multiplier.unwrap_or(retry_defaults.multiplier),
                max_delay: section
                    .retry_max_secs
                    .map(Duration::from_secs)
                    .unwrap_or(retry_defaults.max_delay),
            },
            max_retries: section.max_retries.unwrap_or(3),
            ..BacklogConfig::default()
        };

        Self {
            fetcher,
            llm: config.llm.clone(),
            pipeline,
            orchestrator,
            backlog,
            backlog_max_tasks: section.max_tasks.unwrap_or(50),
            settings,
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--target flag).
    pub data: Option<PathBuf>,
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn is_db_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || path.is_file()
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => match Config::load_from_path(path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                Config::default()
            }
        },
        None => Config::load().await,
    };

    let base_dir = if options.use_cwd {
        current_dir()
    } else {
        config.base_dir().unwrap_or_else(current_dir)
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);

    // --target wins over the config file
    if let Some(data) = options.data {
        let data = if data.is_absolute() {
            data
        } else {
            current_dir().join(data)
        };
        if is_db_file(&data) {
            let filename = data
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_DATABASE_FILENAME)
                .to_string();
            let dir = data.parent().unwrap_or(Path::new(".")).to_path_buf();
            settings = Settings {
                database_filename: filename,
                ..Settings::with_data_dir(dir)
            };
        } else {
            settings = Settings {
                database_filename: settings.database_filename.clone(),
                ..Settings::with_data_dir(data)
            };
        }
        config.apply_network_overrides(&mut settings);
    }

    (settings, config)
}

impl Config {
    /// Re-apply the non-path settings after the data dir was overridden.
    fn apply_network_overrides(&self, settings: &mut Settings) {
        let paths_free = Config {
            data_dir: None,
            database: None,
            reports_dir: None,
            source_path: None,
            ..self.clone()
        };
        paths_free.apply_to_settings(settings, &current_dir());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_toml_with_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tablescout.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "./data"
request_timeout = 10
target_language = "EN"

[fetch]
strategy = "static"
browser_domains = ["spa.example"]

[batch]
workers = 4
pause_secs = 0
write_reports = true

[backlog]
max_retries = 5
retry_base_secs = 30
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.base_dir().as_deref(), Some(dir.path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, dir.path());
        assert_eq!(settings.data_dir, dir.path().join("./data"));
        assert_eq!(settings.database_path(), dir.path().join("./data").join(DEFAULT_DATABASE_FILENAME));
        assert_eq!(settings.target_language, "en");

        let pc = PipelineConfig::new(settings, &config);
        assert_eq!(pc.fetcher.timeout, Duration::from_secs(10));
        assert_eq!(pc.fetcher.browser_domains, vec!["spa.example"]);
        assert_eq!(pc.pipeline.strategy, FetchStrategy::Static);
        assert_eq!(pc.orchestrator.workers, 4);
        assert_eq!(pc.orchestrator.batch_size, 50);
        assert!(pc.orchestrator.pause.is_zero());
        assert_eq!(pc.orchestrator.report_dir, Some(dir.path().join("./data").join("reports")));
        assert_eq!(pc.backlog.max_retries, 5);
        assert_eq!(pc.backlog.retry.base_delay, Duration::from_secs(30));
        assert_eq!(pc.backlog.retry.max_delay, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempdir().unwrap();

        let yaml = dir.path().join("c.yaml");
        std::fs::write(&yaml, "request_delay_ms: 250\nbatch:\n  batch_size: 5\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.request_delay_ms, Some(250));
        assert_eq!(config.batch.batch_size, Some(5));

        let json = dir.path().join("c.json");
        std::fs::write(&json, r#"{"respect_robots": false, "fetch": {"max_images": 3}}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.respect_robots, Some(false));
        assert_eq!(config.fetch.max_images, Some(3));
        assert_eq!(config.batch.task_type, None);
        assert_eq!(config.source_path.as_deref(), Some(json.as_path()));
    }

    #[tokio::test]
    async fn test_parse_errors_name_the_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "workers = [").unwrap();
        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));

        let missing = Config::load_from_path(&dir.path().join("nope.toml")).await.unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn test_defaults() {
        let pc = PipelineConfig::new(Settings::with_data_dir(PathBuf::from("/tmp/ts")), &Config::default());
        assert_eq!(pc.orchestrator.batch_size, 50);
        assert_eq!(pc.orchestrator.workers, 10);
        assert_eq!(pc.orchestrator.pause, Duration::from_secs(30));
        assert_eq!(pc.orchestrator.item_timeout, Duration::from_secs(300));
        assert_eq!(pc.orchestrator.max_errors, 20);
        assert!(pc.orchestrator.report_dir.is_none());
        assert_eq!(pc.backlog_max_tasks, 50);
        assert_eq!(pc.backlog.max_retries, 3);
        assert_eq!(pc.fetcher.min_content_chars, 200);
        assert_eq!(pc.fetcher.rate_limit.base_delay, Duration::from_secs(2));
        assert!(pc.fetcher.respect_robots);
        assert_eq!(pc.settings.budget_state_file, PathBuf::from("/tmp/ts/token_budget.json"));
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::default();
        let base = Path::new("/srv/tablescout");
        assert_eq!(config.resolve_path("/abs/x", base), PathBuf::from("/abs/x"));
        assert_eq!(config.resolve_path("rel/x", base), PathBuf::from("/srv/tablescout/rel/x"));
        assert!(!config.resolve_path("~/x", base).starts_with("~"));
    }
}
