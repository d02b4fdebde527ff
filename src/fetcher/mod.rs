//! Page retrieval: static HTTP, browser rendering, or automatic fallback.
//!
//! The fetcher never touches persistent state. All requests to one origin
//! go through the shared [`RateLimiter`], whichever worker issues them.

mod browser;
mod discover;
mod http_client;
pub mod rate_limiter;
mod robots;

pub use browser::{BrowserEngineConfig, BrowserFetcher, RenderedPage};
pub use discover::{discover_images, discover_subpages, DiscoveredImage};
pub use http_client::{resolve_user_agent, HttpClient, HttpResponse, USER_AGENT};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use robots::{RobotsCache, RobotsRules};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::models::FetchMethod;
use crate::normalize;

/// How to retrieve a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Static,
    Browser,
    /// Static first, browser when that fails or comes back thin.
    #[default]
    Auto,
}

/// Raw page content and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub content: String,
    /// Length of `content` in bytes.
    pub content_length: usize,
    pub method: FetchMethod,
    pub final_url: String,
}

impl FetchedPage {
    pub fn new(content: String, method: FetchMethod, final_url: impl Into<String>) -> Self {
        Self {
            content_length: content.len(),
            content,
            method,
            final_url: final_url.into(),
        }
    }
}

/// Fetch failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Blocked by robots.txt: {0}")]
    Blocked(String),

    #[error("Unsupported content type {content_type} at {url}")]
    UnsupportedContent { content_type: String, url: String },

    #[error("Empty response from {0}")]
    EmptyContent(String),

    #[error("Browser fetch failed: {0}")]
    Browser(String),
}

impl FetchError {
    pub fn from_reqwest(err: reqwest::Error, url: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout(url.to_string())
        } else if err.is_builder() {
            Self::InvalidUrl(url.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            Self::Connection(err.to_string())
        }
    }

    /// Retrying cannot help: bad URL, robots disallow, or a 4xx other than
    /// 408 and 429.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::InvalidUrl(_) | Self::Blocked(_) | Self::UnsupportedContent { .. } => true,
            Self::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }
}

/// Anything that can produce a page for a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str, strategy: FetchStrategy) -> Result<FetchedPage, FetchError>;
}

/// Fetcher settings.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    /// Extra sleep after every request, on top of the rate limiter.
    pub request_delay: Duration,
    /// None, "impersonate", or a literal agent string.
    pub user_agent: Option<String>,
    pub respect_robots: bool,
    /// Auto mode falls back to the browser below this much visible text.
    pub min_content_chars: usize,
    /// Hosts that only render client-side; Auto goes straight to the browser.
    pub browser_domains: Vec<String>,
    pub browser: BrowserEngineConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            request_delay: Duration::ZERO,
            user_agent: None,
            respect_robots: true,
            min_content_chars: 200,
            browser_domains: Vec::new(),
            browser: BrowserEngineConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate-limited, robots-aware page fetcher shared by all workers.
pub struct Fetcher {
    config: FetcherConfig,
    client: HttpClient,
    robots: RobotsCache,
    browser: BrowserFetcher,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let rate_limiter = RateLimiter::with_config(config.rate_limit.clone());
        let client = HttpClient::with_rate_limiter(
            config.timeout,
            config.request_delay,
            rate_limiter,
            config.user_agent.as_deref(),
        )
        .map_err(|e| FetchError::Connection(format!("failed to build HTTP client: {}", e)))?;
        let browser = BrowserFetcher::new(config.browser.clone());

        Ok(Self {
            config,
            client,
            robots: RobotsCache::new(),
            browser,
        })
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        self.client.rate_limiter()
    }

    /// Shut down the shared browser, if one was started.
    pub async fn close(&self) {
        self.browser.close().await;
    }

    fn validate(url: &str) -> Result<Url, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
            _ => Err(FetchError::InvalidUrl(url.to_string())),
        }
    }

    fn is_browser_domain(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.config.browser_domains.iter().any(|d| {
            let d = d.trim().to_lowercase();
            host == d || host.ends_with(&format!(".{}", d))
        })
    }

    async fn fetch_static(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;

        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status.as_u16(),
                url: url.to_string(),
            });
        }
        if !response.is_textual() {
            return Err(FetchError::UnsupportedContent {
                content_type: response.content_type().unwrap_or("").to_string(),
                url: url.to_string(),
            });
        }

        let final_url = response.final_url.clone();
        let content = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url))?;
        if content.trim().is_empty() {
            return Err(FetchError::EmptyContent(url.to_string()));
        }

        Ok(FetchedPage::new(content, FetchMethod::Static, final_url))
    }

    async fn fetch_browser(&self, url: &str) -> Result<FetchedPage, FetchError> {
        // Keep rendered fetches inside the same per-origin budget.
        self.client.rate_limiter().acquire(url).await;

        let rendered = self
            .browser
            .fetch(url)
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        if rendered.content.trim().is_empty() {
            return Err(FetchError::EmptyContent(url.to_string()));
        }
        Ok(FetchedPage::new(
            rendered.content,
            FetchMethod::Browser,
            rendered.final_url,
        ))
    }

    async fn fetch_auto(&self, url: &str, parsed: &Url) -> Result<FetchedPage, FetchError> {
        if self.is_browser_domain(parsed) {
            debug!("{} is configured as browser-only", url);
            return self.fetch_browser(url).await;
        }

        match self.fetch_static(url).await {
            Ok(page) => {
                let text_len = normalize::visible_text(&page.content).chars().count();
                if text_len >= self.config.min_content_chars {
                    return Ok(page);
                }
                info!(
                    "Static fetch of {} yielded {} chars of text, trying browser",
                    url, text_len
                );
                match self.fetch_browser(url).await {
                    Ok(rendered) => {
                        let rendered_len = normalize::visible_text(&rendered.content).chars().count();
                        if rendered_len > text_len {
                            Ok(rendered)
                        } else {
                            Ok(page)
                        }
                    }
                    Err(e) => {
                        debug!("Browser fallback failed for {}: {}", url, e);
                        Ok(page)
                    }
                }
            }
            Err(e) if e.is_permanent() => Err(e),
            Err(e) => {
                warn!("Static fetch of {} failed ({}), trying browser", url, e);
                self.fetch_browser(url).await.map_err(|browser_err| {
                    debug!("Browser fallback failed for {}: {}", url, browser_err);
                    e
                })
            }
        }
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch(&self, url: &str, strategy: FetchStrategy) -> Result<FetchedPage, FetchError> {
        let parsed = Self::validate(url)?;

        if self.config.respect_robots && !self.robots.is_allowed(&self.client, url).await {
            return Err(FetchError::Blocked(url.to_string()));
        }

        match strategy {
            FetchStrategy::Static => self.fetch_static(url).await,
            FetchStrategy::Browser => self.fetch_browser(url).await,
            FetchStrategy::Auto => self.fetch_auto(url, &parsed).await,
        }
    }
}
