//! Adaptive per-origin rate limiter.
//!
//! Enforces a minimum interval between requests to the same origin across
//! every worker in the process. Backs off on 429/503, gradually recovers on
//! success.

mod config;
mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

pub use config::{DomainStats, RateLimitConfig};
use domain_state::DomainState;

/// Adaptive rate limiter that tracks per-origin request timing.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Extract the host from a URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
    }

    /// Wait for this origin's next slot. Returns the origin.
    ///
    /// The slot is reserved under the write lock before sleeping, so
    /// concurrent callers for the same origin queue up one delay apart.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay));
            let wait = state.time_until_ready();
            state.last_request = Some(Instant::now() + wait);
            state.total_requests += 1;
            wait
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Some(domain)
    }

    /// Report a successful request. May shrink the delay after a backoff.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        let Some(state) = domains.get_mut(domain) else {
            return;
        };

        state.consecutive_successes += 1;
        if !state.in_backoff || state.consecutive_successes < self.config.recovery_threshold {
            return;
        }

        state.scale_delay(
            self.config.recovery_multiplier,
            self.config.min_delay,
            self.config.max_delay,
        );
        state.consecutive_successes = 0;

        if state.current_delay <= self.config.base_delay {
            state.current_delay = self.config.base_delay;
            state.in_backoff = false;
            info!("{} recovered from rate limit backoff", domain);
        } else {
            debug!("{} delay reduced to {:?}", domain, state.current_delay);
        }
    }

    /// Report a definite rate limit (429 or 503).
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;
            state.scale_delay(
                self.config.backoff_multiplier,
                self.config.min_delay,
                self.config.max_delay,
            );

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Report a server error (5xx other than 503). Mild backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes = 0;
            state.scale_delay(1.5, self.config.min_delay, self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Report an HTTP status for an origin.
    pub async fn report_status(&self, domain: &str, status_code: u16) {
        match status_code {
            429 | 503 => self.report_rate_limit(domain, status_code).await,
            500..=599 => self.report_server_error(domain).await,
            200..=399 => self.report_success(domain).await,
            _ => {}
        }
    }

    /// Get statistics for all origins.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            base_delay: Duration::from_millis(100),
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.5,
            recovery_threshold: 2,
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://Www.Example.com/menu"),
            Some("www.example.com".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_backoff_and_recovery() {
        let limiter = RateLimiter::with_config(fast_config());

        limiter.acquire("https://example.com/1").await;
        limiter.report_status("example.com", 429).await;

        let stats = limiter.get_stats().await;
        let s = stats.get("example.com").unwrap();
        assert!(s.in_backoff);
        assert_eq!(s.current_delay, Duration::from_millis(200));
        assert_eq!(s.rate_limit_hits, 1);

        limiter.report_success("example.com").await;
        limiter.report_success("example.com").await;

        let stats = limiter.get_stats().await;
        let s = stats.get("example.com").unwrap();
        assert!(!s.in_backoff);
        assert_eq!(s.current_delay, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_concurrent_acquires_are_spaced() {
        let limiter = RateLimiter::with_config(fast_config());
        let start = Instant::now();

        let a = limiter.clone();
        let b = limiter.clone();
        let c = limiter.clone();
        tokio::join!(
            a.acquire("https://example.com/a"),
            b.acquire("https://example.com/b"),
            c.acquire("https://example.com/c"),
        );

        // First goes immediately, the other two wait one and two delays.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_origins_are_independent() {
        let limiter = RateLimiter::with_config(fast_config());
        let start = Instant::now();
        limiter.acquire("https://one.example/").await;
        limiter.acquire("https://two.example/").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
