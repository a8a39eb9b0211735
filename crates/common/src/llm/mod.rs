//! Language model abstraction
//!
//! Provides a unified chat-completion interface for:
//! - OpenAI compatible endpoints (`POST {api_base}/chat/completions`)
//! - A deterministic mock for local runs

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message role in a chat exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// One completion request. `stage` labels metrics and logs only.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub stage: &'static str,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            messages: Vec::new(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Text of the last user message
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Trait for chat completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the messages and return the generated text
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI compatible chat completions client
pub struct OpenAiCompatibleModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

/// Output token cap when none is configured
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAiCompatibleModel {
    /// Create a new client
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Cap the output tokens requested by any single call
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }

    fn effective_max_tokens(&self, request: &ChatRequest) -> u32 {
        if request.max_tokens > self.max_tokens {
            tracing::debug!(
                stage = request.stage,
                requested = request.max_tokens,
                cap = self.max_tokens,
                "Clamping requested output tokens"
            );
        }
        request.max_tokens.min(self.max_tokens)
    }

    async fn send(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: self.effective_max_tokens(request),
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LanguageModel {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => format!(
                    "API error {} ({}{}): {}",
                    status.as_u16(),
                    envelope.error.kind.unwrap_or_else(|| "unknown".into()),
                    envelope
                        .error
                        .code
                        .map(|c| format!("/{}", c))
                        .unwrap_or_default(),
                    envelope.error.message
                ),
                Err(_) => format!("API error {}: {}", status.as_u16(), text),
            };
            return Err(AppError::LanguageModel { message });
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| {
            AppError::LanguageModel {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::LanguageModel {
                message: "No choices in response".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let start = Instant::now();
        let result = self.send(request).await;

        metrics::record_llm_request(
            request.stage,
            &self.model,
            start.elapsed().as_secs_f64(),
            result.is_ok(),
        );

        if let Err(ref e) = result {
            tracing::warn!(stage = request.stage, model = %self.model, error = %e, "Language model call failed");
        }

        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock model for local development and tests.
///
/// Clustering prompts get an empty theme list so the single-section
/// fallback runs; everything else gets placeholder prose.
pub struct MockLanguageModel;

impl MockLanguageModel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        if request.stage == crate::generation::themes::STAGE {
            return Ok("[]".to_string());
        }

        Ok(format!(
            "Placeholder {} text generated without a language model provider. \
            Configure APP__LLM__PROVIDER=openai and an API key to produce real content.",
            request.stage
        ))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create a language model client based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAiCompatibleModel::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
            )?
            .with_max_tokens(config.max_tokens)))
        }
        "mock" => Ok(Arc::new(MockLanguageModel::new())),
        other => {
            tracing::warn!(provider = other, "Unknown language model provider, using mock");
            Ok(Arc::new(MockLanguageModel::new()))
        }
    }
}
