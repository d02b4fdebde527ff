//! Daily token budget across model tiers.
//!
//! Calls go to the first tier with room left. When a tier would cross its
//! `stop_at` mark the budget moves on to the next one; when every tier is
//! spent, calls fail with [`LlmError::BudgetExhausted`] until the UTC date
//! changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::LlmError;

/// Rough characters-per-token ratio used when the provider reports no usage.
pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTier {
    pub name: String,
    pub max_tokens: u64,
    /// Switch away from this tier before usage reaches this mark.
    pub stop_at: u64,
}

impl ModelTier {
    pub fn new(name: &str, max_tokens: u64, stop_at: u64) -> Self {
        Self {
            name: name.to_string(),
            max_tokens,
            stop_at,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("gpt-4o", 250_000, 240_000),
            Self::new("gpt-4o-mini", 2_500_000, 2_450_000),
        ]
    }
}

/// Estimate tokens for a piece of text.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count().div_ceil(CHARS_PER_TOKEN) + 4) as u64
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct BudgetState {
    date: Option<NaiveDate>,
    used: HashMap<String, u64>,
    current_tier: usize,
}

pub struct TokenBudget {
    tiers: Vec<ModelTier>,
    state: Mutex<BudgetState>,
    state_file: Option<PathBuf>,
}

impl TokenBudget {
    pub fn new(tiers: Vec<ModelTier>) -> Self {
        Self {
            tiers,
            state: Mutex::new(BudgetState::default()),
            state_file: None,
        }
    }

    /// Persist usage to a JSON file so restarts on the same day keep counting.
    pub fn with_state_file(mut self, path: &Path) -> Self {
        if let Ok(text) = std::fs::read_to_string(path) {
            match serde_json::from_str::<BudgetState>(&text) {
                Ok(state) => self.state = Mutex::new(state),
                Err(e) => warn!("Ignoring unreadable token state {}: {}", path.display(), e),
            }
        }
        self.state_file = Some(path.to_path_buf());
        self
    }

    /// Pick the model for a call of `estimated` tokens.
    pub fn reserve(&self, estimated: u64, now: DateTime<Utc>) -> Result<String, LlmError> {
        let mut state = self.state.lock().map_err(|_| LlmError::BudgetExhausted)?;
        Self::roll_date(&mut state, now.date_naive());

        while let Some(tier) = self.tiers.get(state.current_tier) {
            let used = state.used.get(&tier.name).copied().unwrap_or(0);
            if used + estimated < tier.stop_at {
                return Ok(tier.name.clone());
            }
            state.current_tier += 1;
            if let Some(next) = self.tiers.get(state.current_tier) {
                info!("Token tier {} spent, switching to {}", tier.name, next.name);
            }
        }

        warn!("All token tiers exhausted for today");
        Err(LlmError::BudgetExhausted)
    }

    /// Record actual usage for a model.
    pub fn record(&self, model: &str, tokens: u64, now: DateTime<Utc>) {
        let snapshot = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            Self::roll_date(&mut state, now.date_naive());
            *state.used.entry(model.to_string()).or_insert(0) += tokens;
            state.clone()
        };

        if let Some(ref path) = self.state_file {
            let written = serde_json::to_string_pretty(&snapshot)
                .map_err(std::io::Error::other)
                .and_then(|json| std::fs::write(path, json));
            if let Err(e) = written {
                warn!("Failed to save token state to {}: {}", path.display(), e);
            }
        }
    }

    /// Tokens used today per model.
    pub fn usage(&self) -> HashMap<String, u64> {
        self.state
            .lock()
            .map(|s| s.used.clone())
            .unwrap_or_default()
    }

    fn roll_date(state: &mut BudgetState, today: NaiveDate) {
        if state.date != Some(today) {
            if state.date.is_some() {
                info!("New day, resetting token usage");
            }
            *state = BudgetState {
                date: Some(today),
                ..Default::default()
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn budget() -> TokenBudget {
        TokenBudget::new(vec![
            ModelTier::new("big", 100, 90),
            ModelTier::new("small", 1000, 950),
        ])
    }

    #[test]
    fn test_switches_tier_then_exhausts() {
        let b = budget();
        let now = Utc::now();

        assert_eq!(b.reserve(50, now).unwrap(), "big");
        b.record("big", 50, now);
        // 50 + 50 crosses 90
        assert_eq!(b.reserve(50, now).unwrap(), "small");
        b.record("small", 940, now);
        assert!(matches!(b.reserve(50, now), Err(LlmError::BudgetExhausted)));
    }

    #[test]
    fn test_resets_on_new_day() {
        let b = budget();
        let today = Utc::now();
        b.record("big", 89, today);
        b.record("small", 949, today);
        assert!(b.reserve(10, today).is_err());

        let tomorrow = today + Duration::days(1);
        assert_eq!(b.reserve(10, tomorrow).unwrap(), "big");
        assert!(b.usage().is_empty());
    }

    #[test]
    fn test_state_file_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let now = Utc::now();

        let first = budget().with_state_file(&path);
        first.record("big", 80, now);

        let second = budget().with_state_file(&path);
        assert_eq!(second.usage().get("big"), Some(&80));
        assert_eq!(second.reserve(20, now).unwrap(), "small");
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 4);
        assert_eq!(estimate_tokens("abcd"), 5);
        assert_eq!(estimate_tokens("abcde"), 6);
    }
}
