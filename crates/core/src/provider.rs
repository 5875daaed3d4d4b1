//! Provider trait: the abstraction over LLM backends.
//!
//! The wire contract is deliberately generic: a request is a model id, a
//! message history, a temperature and a token cap; a response is generated
//! text plus input/output token counts. Concrete dialects are adapters
//! behind [`Provider`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The model to use (e.g. "gpt-4o", "llama3").
    pub model: String,

    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    /// A single-prompt request.
    pub fn from_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::new(model, vec![Message::user(prompt)])
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Total characters across all messages, used for token estimates.
    pub fn content_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }

    /// The last user message, if any. Used as the fallback cache key.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,

    /// Which provider produced the response ("fallback" for degraded answers).
    pub provider_id: String,

    pub model: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub usage: Usage,

    /// True when the content came from the degradation layer, not a model.
    #[serde(default)]
    pub from_fallback: bool,
}

impl LlmResponse {
    pub fn new(
        content: impl Into<String>,
        provider_id: impl Into<String>,
        model: impl Into<String>,
        usage: Usage,
    ) -> Self {
        Self {
            content: content.into(),
            provider_id: provider_id.into(),
            model: model.into(),
            timestamp: Utc::now(),
            usage,
            from_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    /// Breaker is half-open: the provider is being probed.
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub status: HealthStatus,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProviderHealth {
    pub fn new(provider_id: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            provider_id: provider_id.into(),
            status,
            last_checked: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this. The provider manager selects among
/// registered providers without knowing which dialect each one speaks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A stable identifier (e.g. "openai", "local").
    fn name(&self) -> &str;

    /// Whether this provider can serve the given model id.
    fn supports_model(&self, _model: &str) -> bool {
        true
    }

    /// Send a request and get a complete response.
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError>;

    /// Lightweight liveness probe.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
