//! Browser-rendered fetching for JavaScript-heavy restaurant sites.
//!
//! Uses chromiumoxide (CDP). The browser is launched lazily on first use and
//! shared by every worker; each fetch opens and closes its own tab.

#[cfg(feature = "browser")]
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tokio::sync::Mutex;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use anyhow::Context;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig};
#[cfg(feature = "browser")]
use futures::StreamExt;

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run without a window (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Page load timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Extra time to let client-side rendering settle, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote DevTools URL (e.g. "ws://localhost:9222"). Connects instead of
    /// launching when set.
    #[serde(default)]
    pub remote_url: Option<String>,
}

fn default_headless() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_settle_ms() -> u64 {
    1000
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            timeout: default_timeout(),
            settle_ms: default_settle_ms(),
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub content: String,
}

#[cfg(feature = "browser")]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    browser: Mutex<Option<Arc<Browser>>>,
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    const CHROME_BINARIES: &'static [&'static str] = &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ];

    pub fn new(config: BrowserEngineConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                return Ok(p.to_path_buf());
            }
        }

        if let Some(paths) = std::env::var_os("PATH") {
            for dir in std::env::split_paths(&paths) {
                for bin in Self::CHROME_BINARIES {
                    let candidate = dir.join(bin);
                    if candidate.is_file() {
                        return Ok(candidate);
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found. Install chromium or set browser.remote_url"
        ))
    }

    async fn ensure_browser(&self) -> Result<Arc<Browser>> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(browser.clone());
        }

        let (browser, mut handler) = match self.config.remote_url.as_deref() {
            Some(remote) => {
                info!("Connecting to remote browser at {}", remote);
                Browser::connect(remote)
                    .await
                    .context("Failed to connect to remote browser")?
            }
            None => {
                let chrome = Self::find_chrome()?;
                info!(
                    "Launching {} (headless={})",
                    chrome.display(),
                    self.config.headless
                );

                let mut builder = BrowserConfig::builder().chrome_executable(chrome);
                if !self.config.headless {
                    builder = builder.with_head();
                }
                builder = builder
                    .arg("--disable-blink-features=AutomationControlled")
                    .arg("--disable-dev-shm-usage")
                    .arg("--no-first-run")
                    .arg("--no-default-browser-check")
                    .arg("--no-sandbox")
                    .arg("--disable-gpu");
                for arg in &self.config.chrome_args {
                    builder = builder.arg(arg);
                }

                let config = builder
                    .build()
                    .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;
                Browser::launch(config)
                    .await
                    .context("Failed to launch browser")?
            }
        };

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let browser = Arc::new(browser);
        *guard = Some(browser.clone());
        Ok(browser)
    }

    /// Render a URL and return its DOM as HTML.
    pub async fn fetch(&self, url: &str) -> Result<RenderedPage> {
        let browser = self.ensure_browser().await?;
        let page = browser.new_page("about:blank").await?;

        let nav = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;

        let timeout = self.config.page_timeout();
        let rendered = tokio::time::timeout(timeout, async {
            page.execute(nav).await?;

            let ready = r#"
                new Promise((resolve) => {
                    if (document.readyState === 'complete') {
                        resolve(document.readyState);
                    } else {
                        window.addEventListener('load', () => resolve('complete'));
                        setTimeout(() => resolve('timeout'), 15000);
                    }
                })
            "#;
            if let Err(e) = page.evaluate(ready.to_string()).await {
                debug!("Could not read ready state for {}: {}", url, e);
            }

            tokio::time::sleep(Duration::from_millis(self.config.settle_ms)).await;

            let final_url = page
                .url()
                .await?
                .map(|u| u.to_string())
                .unwrap_or_else(|| url.to_string());
            let content = page.content().await?;
            Ok::<_, anyhow::Error>(RenderedPage { final_url, content })
        })
        .await;

        let _ = page.close().await;

        match rendered {
            Ok(result) => result,
            Err(_) => {
                warn!("Browser render of {} timed out after {:?}", url, timeout);
                Err(anyhow::anyhow!("render timed out after {:?}", timeout))
            }
        }
    }

    pub async fn close(&self) {
        self.browser.lock().await.take();
    }
}

#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher {
    #[allow(dead_code)]
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub async fn fetch(&self, _url: &str) -> Result<RenderedPage> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }

    pub async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_toml() {
        let config: BrowserEngineConfig = toml::from_str("").unwrap();
        assert!(config.headless);
        assert_eq!(config.page_timeout(), Duration::from_secs(30));
        assert_eq!(config.settle_ms, 1000);
        assert!(config.remote_url.is_none());
    }
}
