//! Rate-limited HTTP client shared by every fetch in a run.

mod response;
mod user_agent;

pub use response::HttpResponse;
pub use user_agent::{resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::debug;

use super::rate_limiter::RateLimiter;

/// HTTP client that waits on the per-origin rate limiter before each request
/// and reports the outcome back to it.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
    rate_limiter: RateLimiter,
    user_agent: String,
}

impl HttpClient {
    /// Create a client with its own rate limiter.
    pub fn new(
        timeout: Duration,
        request_delay: Duration,
        user_agent_config: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        Self::with_rate_limiter(timeout, request_delay, RateLimiter::new(), user_agent_config)
    }

    /// Create a client that shares a rate limiter with other clients.
    pub fn with_rate_limiter(
        timeout: Duration,
        request_delay: Duration,
        rate_limiter: RateLimiter,
        user_agent_config: Option<&str>,
    ) -> Result<Self, reqwest::Error> {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(15)))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            request_delay,
            rate_limiter,
            user_agent,
        })
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// GET a URL under the rate limiter.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let domain = self.rate_limiter.acquire(url).await;

        let start = Instant::now();
        let result = self.client.get(url).send().await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                if let Some(ref domain) = domain {
                    if e.is_connect() {
                        self.rate_limiter.report_server_error(domain).await;
                    }
                }
                return Err(e);
            }
        };

        let status = response.status();
        debug!(
            "GET {} -> {} in {:?}",
            url,
            status.as_u16(),
            start.elapsed()
        );

        if let Some(ref domain) = domain {
            self.rate_limiter
                .report_status(domain, status.as_u16())
                .await;
        }

        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }
        let final_url = response.url().to_string();

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        Ok(HttpResponse {
            status,
            headers,
            final_url,
            response,
        })
    }

    /// GET a URL and return its body when the status is 2xx.
    pub async fn get_text(&self, url: &str) -> Result<Option<String>, reqwest::Error> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Ok(None);
        }
        response.text().await.map(Some)
    }
}
