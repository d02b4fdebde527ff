//! Generative analysis service: client, prompts, output decoding and the
//! daily token budget.

mod budget;
mod client;
mod config;
pub mod lenient;
pub mod prompts;

pub use budget::{estimate_tokens, ModelTier, TokenBudget};
pub use client::LlmClient;
pub use config::{LlmConfig, LlmProvider};
pub use lenient::Decoded;

use async_trait::async_trait;

/// Which template a prompt was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Translation,
    Summary,
    Menu,
    ImageClassification,
}

impl PromptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Translation => "translation",
            Self::Summary => "summary",
            Self::Menu => "menu",
            Self::ImageClassification => "image",
        }
    }
}

/// A single request to the analysis service.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub kind: PromptKind,
    pub system: String,
    pub user: String,
    /// Ask the provider for JSON output where it supports that.
    pub json_output: bool,
}

impl Prompt {
    pub fn new(kind: PromptKind, system: &str, user: String, json_output: bool) -> Self {
        Self {
            kind,
            system: system.to_string(),
            user,
            json_output,
        }
    }
}

/// Anything that can answer a prompt.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError>;
}

/// Errors that can occur during analysis calls.
#[derive(Debug)]
pub enum LlmError {
    /// Failed to reach the service
    Connection(String),
    /// Request timed out
    Timeout(String),
    /// Service said slow down (HTTP 429)
    RateLimited(String),
    /// Service returned an error
    Api { status: u16, message: String },
    /// Response body was not what the API promised
    Parse(String),
    /// Every token tier is spent for today
    BudgetExhausted,
    /// Analysis is switched off in config
    Disabled,
}

impl LlmError {
    /// The service could not be used at all, as opposed to answering badly.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Connection(_)
            | Self::Timeout(_)
            | Self::RateLimited(_)
            | Self::BudgetExhausted
            | Self::Disabled => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Parse(_) => false,
        }
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            LlmError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            LlmError::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            LlmError::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            LlmError::Parse(msg) => write!(f, "Parse error: {}", msg),
            LlmError::BudgetExhausted => write!(f, "Daily token budget exhausted"),
            LlmError::Disabled => write!(f, "LLM is disabled"),
        }
    }
}

impl std::error::Error for LlmError {}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_content(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_content_is_char_safe() {
        assert_eq!(truncate_content("crème brûlée", 5), "crème");
        assert_eq!(truncate_content("short", 100), "short");
        assert_eq!(truncate_content("", 3), "");
        assert_eq!(truncate_content("寿司と天ぷら", 2), "寿司");
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(LlmError::Connection("refused".into()).is_unavailable());
        assert!(LlmError::BudgetExhausted.is_unavailable());
        assert!(LlmError::Api { status: 502, message: String::new() }.is_unavailable());
        assert!(!LlmError::Api { status: 400, message: String::new() }.is_unavailable());
        assert!(!LlmError::Parse("bad".into()).is_unavailable());
    }
}
