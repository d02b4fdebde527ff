//! LLM client configuration.

use serde::{Deserialize, Serialize};

use super::budget::ModelTier;

/// LLM provider type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Ollama API (local, default)
    #[default]
    Ollama,
    /// OpenAI-compatible API (OpenAI, Groq, Together.ai, etc.)
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" | "groq" | "together" => Some(Self::OpenAI),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }
}

/// Configuration for the analysis service client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether analysis calls are made at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub provider: LlmProvider,
    /// API endpoint (provider-specific defaults apply)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key for OpenAI-compatible providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model used when no token budget is configured
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in a response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Generation temperature (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Daily model tiers. Empty means no budget is enforced.
    #[serde(default)]
    pub budget: Vec<ModelTier>,
}

fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    /// Defaults without env overrides.
    pub fn base_default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: LlmProvider::default(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            budget: Vec::new(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENABLED`: "true" or "false"
    /// - `LLM_PROVIDER`: "ollama" (default), "openai", "groq", or "together"
    /// - `LLM_ENDPOINT`: API endpoint (defaults based on provider)
    /// - `LLM_API_KEY`: API key for OpenAI-compatible providers
    /// - `LLM_MODEL`: Model name
    /// - `LLM_MAX_TOKENS`: Maximum tokens in a response
    /// - `LLM_TEMPERATURE`: Generation temperature
    /// - `LLM_TIMEOUT_SECS`: Per-request timeout
    ///
    /// LLM_PROVIDER wins over auto-detection from API keys. With no explicit
    /// provider, `GROQ_API_KEY` and then `OPENAI_API_KEY` select the
    /// OpenAI-compatible provider.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("LLM_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }

        let explicit_provider = std::env::var("LLM_PROVIDER").ok();
        if let Some(provider) = explicit_provider.as_deref().and_then(LlmProvider::from_str) {
            self.provider = provider;
        }

        let explicit_endpoint = std::env::var("LLM_ENDPOINT").ok();
        if let Some(ref endpoint) = explicit_endpoint {
            self.endpoint = endpoint.clone();
        }

        if let Ok(val) = std::env::var("LLM_API_KEY") {
            self.api_key = Some(val);
        }

        match explicit_provider.map(|p| p.to_lowercase()) {
            Some(provider) => {
                if explicit_endpoint.is_none() {
                    if let Some(endpoint) = provider_endpoint(&provider) {
                        self.endpoint = endpoint.to_string();
                    }
                }
                if self.api_key.is_none() {
                    self.api_key = match provider.as_str() {
                        "groq" => std::env::var("GROQ_API_KEY").ok(),
                        "openai" => std::env::var("OPENAI_API_KEY").ok(),
                        _ => None,
                    };
                }
            }
            None if self.api_key.is_none() => {
                let detected = std::env::var("GROQ_API_KEY")
                    .ok()
                    .map(|k| (k, "groq"))
                    .or_else(|| std::env::var("OPENAI_API_KEY").ok().map(|k| (k, "openai")));
                if let Some((key, provider)) = detected {
                    self.api_key = Some(key);
                    self.provider = LlmProvider::OpenAI;
                    if explicit_endpoint.is_none() {
                        if let Some(endpoint) = provider_endpoint(provider) {
                            self.endpoint = endpoint.to_string();
                        }
                    }
                }
            }
            None => {}
        }

        if let Ok(val) = std::env::var("LLM_MODEL") {
            self.model = val;
        }
        if let Some(n) = env_parse("LLM_MAX_TOKENS") {
            self.max_tokens = n;
        }
        if let Some(t) = env_parse("LLM_TEMPERATURE") {
            self.temperature = t;
        }
        if let Some(n) = env_parse("LLM_TIMEOUT_SECS") {
            self.timeout_secs = n;
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Use the default daily tiers (gpt-4o, then gpt-4o-mini).
    pub fn with_default_budget(mut self) -> Self {
        self.budget = ModelTier::defaults();
        self
    }
}

fn provider_endpoint(provider: &str) -> Option<&'static str> {
    match provider {
        "groq" => Some("https://api.groq.com/openai"),
        "openai" => Some("https://api.openai.com"),
        "together" => Some("https://api.together.xyz"),
        _ => None,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_aliases() {
        assert_eq!(LlmProvider::from_str("Groq"), Some(LlmProvider::OpenAI));
        assert_eq!(LlmProvider::from_str("ollama"), Some(LlmProvider::Ollama));
        assert_eq!(LlmProvider::from_str("bard"), None);
    }

    #[test]
    fn test_base_default_deserializes_from_empty() {
        let config: LlmConfig = toml::from_str("").unwrap();
        assert_eq!(config, LlmConfig::base_default());
        assert!(config.budget.is_empty());
    }

    #[test]
    fn test_budget_tiers_from_toml() {
        let config: LlmConfig = toml::from_str(
            r#"
            provider = "openai"
            [[budget]]
            name = "gpt-4o"
            max_tokens = 1000
            stop_at = 900
            "#,
        )
        .unwrap();
        assert_eq!(config.provider, LlmProvider::OpenAI);
        assert_eq!(config.budget.len(), 1);
        assert_eq!(config.budget[0].stop_at, 900);
    }
}
