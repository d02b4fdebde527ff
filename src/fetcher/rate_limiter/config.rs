//! Rate limiter configuration.

use std::time::Duration;

/// Configuration for the per-origin rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Delay between requests to the same origin when nothing is wrong.
    pub base_delay: Duration,
    /// Floor when recovering from backoff.
    pub min_delay: Duration,
    /// Ceiling for backoff.
    pub max_delay: Duration,
    /// Applied to the current delay on 429/503.
    pub backoff_multiplier: f64,
    /// Applied to the current delay on recovery (< 1.0).
    pub recovery_multiplier: f64,
    /// Consecutive successes needed before the delay shrinks.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.75,
            recovery_threshold: 5,
        }
    }
}

impl RateLimitConfig {
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.min_delay = self.min_delay.min(base_delay);
        self
    }
}

/// Snapshot of one origin's limiter state.
#[derive(Debug, Clone)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}
