//! HTTP client for the analysis service.
//!
//! Speaks the Ollama `/api/generate` API and the OpenAI-compatible
//! `/v1/chat/completions` API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::budget::{estimate_tokens, TokenBudget};
use super::config::{LlmConfig, LlmProvider};
use super::{LlmBackend, LlmError, Prompt};

pub struct LlmClient {
    config: LlmConfig,
    client: Client,
    budget: Option<Arc<TokenBudget>>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    usage: Option<ChatUsage>,
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    message: String,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(format!("failed to build client: {}", e)))?;

        let budget = if config.budget.is_empty() {
            None
        } else {
            Some(Arc::new(TokenBudget::new(config.budget.clone())))
        };

        Ok(Self {
            config,
            client,
            budget,
        })
    }

    /// Share a budget (for example one backed by a state file).
    pub fn with_budget(mut self, budget: Arc<TokenBudget>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the service answers at all.
    pub async fn is_available(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let url = match self.config.provider {
            LlmProvider::Ollama => format!("{}/api/tags", self.endpoint()),
            LlmProvider::OpenAI => format!("{}/v1/models", self.endpoint()),
        };
        let mut request = self.client.get(&url);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }
        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn map_send_error(e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(e.to_string())
        } else {
            LlmError::Connection(e.to_string())
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited(body));
        }
        Err(LlmError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    /// Returns the response text and tokens used, when reported.
    async fn call_ollama(&self, model: &str, prompt: &Prompt) -> Result<(String, Option<u64>), LlmError> {
        let request = OllamaRequest {
            model,
            prompt: prompt.user.clone(),
            system: &prompt.system,
            stream: false,
            format: prompt.json_output.then_some("json"),
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.endpoint());
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let resp = Self::check_status(resp).await?;

        let body: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        let tokens = match (body.prompt_eval_count, body.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        };
        Ok((body.response, tokens))
    }

    async fn call_openai(&self, model: &str, prompt: &Prompt) -> Result<(String, Option<u64>), LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            LlmError::Connection("no API key set (LLM_API_KEY or OPENAI_API_KEY)".to_string())
        })?;

        let request = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: prompt
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let url = format!("{}/v1/chat/completions", self.endpoint());
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let resp = Self::check_status(resp).await?;

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(LlmError::Api {
                status: 200,
                message: error.message,
            });
        }

        let content = body
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("response has no choices".to_string()))?;
        Ok((content, body.usage.map(|u| u.total_tokens)))
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let estimated = estimate_tokens(&prompt.system) + estimate_tokens(&prompt.user);
        let model = match self.budget {
            Some(ref budget) => budget.reserve(estimated, Utc::now())?,
            None => self.config.model.clone(),
        };

        debug!("{} prompt to {} (~{} tokens)", prompt.kind.as_str(), model, estimated);

        let (text, used) = match self.config.provider {
            LlmProvider::Ollama => self.call_ollama(&model, prompt).await?,
            LlmProvider::OpenAI => self.call_openai(&model, prompt).await?,
        };

        if let Some(ref budget) = self.budget {
            let output = estimate_tokens(&text);
            budget.record(&model, used.unwrap_or(estimated + output), Utc::now());
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::PromptKind;

    fn prompt() -> Prompt {
        Prompt::new(PromptKind::Summary, "system", "user".to_string(), true)
    }

    #[tokio::test]
    async fn test_disabled_client_refuses() {
        let mut config = LlmConfig::base_default();
        config.enabled = false;
        let client = LlmClient::new(config).unwrap();
        assert!(matches!(
            client.complete(&prompt()).await,
            Err(LlmError::Disabled)
        ));
        assert!(!client.is_available().await);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let config = LlmConfig::base_default().with_endpoint("http://127.0.0.1:9");
        let client = LlmClient::new(config).unwrap();
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(err.is_unavailable(), "{}", err);
    }

    #[tokio::test]
    async fn test_exhausted_budget_short_circuits() {
        let mut config = LlmConfig::base_default().with_endpoint("http://127.0.0.1:9");
        config.budget = vec![crate::llm::ModelTier::new("tiny", 10, 1)];
        let client = LlmClient::new(config).unwrap();
        assert!(matches!(
            client.complete(&prompt()).await,
            Err(LlmError::BudgetExhausted)
        ));
    }

    #[test]
    fn test_chat_request_shape() {
        let p = prompt();
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: &p.user,
            }],
            max_tokens: 10,
            temperature: 0.0,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["content"], "user");
    }
}
