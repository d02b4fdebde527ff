//! Per-origin rate limiting state.

use std::time::{Duration, Instant};

/// State for a single origin.
#[derive(Debug, Clone)]
pub struct DomainState {
    pub current_delay: Duration,
    /// Release time of the most recently scheduled request. May lie in the
    /// future while a caller is waiting for its slot.
    pub last_request: Option<Instant>,
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Time until this origin may receive another request.
    pub fn time_until_ready(&self) -> Duration {
        self.last_request
            .map(|last| (last + self.current_delay).saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Multiply the current delay, clamped to `[floor, ceiling]`.
    pub fn scale_delay(&mut self, factor: f64, floor: Duration, ceiling: Duration) {
        let scaled = Duration::from_secs_f64(self.current_delay.as_secs_f64() * factor);
        self.current_delay = scaled.clamp(floor, ceiling.max(floor));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_state_is_ready() {
        let state = DomainState::new(Duration::from_secs(2));
        assert_eq!(state.time_until_ready(), Duration::ZERO);
    }

    #[test]
    fn test_scale_delay_clamps() {
        let mut state = DomainState::new(Duration::from_secs(2));
        state.scale_delay(100.0, Duration::from_millis(500), Duration::from_secs(60));
        assert_eq!(state.current_delay, Duration::from_secs(60));
        state.scale_delay(0.0001, Duration::from_millis(500), Duration::from_secs(60));
        assert_eq!(state.current_delay, Duration::from_millis(500));
    }
}
