//! Generic HTTP JSON provider.
//!
//! Speaks the plain wire contract
//! `{model, messages, temperature, max_tokens}` →
//! `{content, usage: {input_tokens, output_tokens}}`.

use async_trait::async_trait;
use ferroact_config::ProviderConfig;
use ferroact_core::error::ProviderError;
use ferroact_core::message::Message;
use ferroact_core::provider::{LlmRequest, LlmResponse, Provider, Usage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpProvider {
    id: String,
    api_url: String,
    api_key: Option<String>,
    models: Vec<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("id", &self.id)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl HttpProvider {
    /// Transport-level timeout. The resilience pipeline normally fires first.
    const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(id: impl Into<String>, api_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Self::CLIENT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            id: id.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            models: Vec::new(),
            client,
        })
    }

    /// Build from a `[providers.<id>]` section with an already-resolved key.
    pub fn from_config(
        id: &str,
        config: &ProviderConfig,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let mut provider = Self::new(id, &config.api_url)?.with_models(config.models.clone());
        provider.api_key = api_key;
        Ok(provider)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Restrict the provider to these models. Empty means any model.
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn body<'a>(request: &'a LlmRequest) -> WireRequest<'a> {
        WireRequest {
            model: &request.model,
            messages: request.messages.iter().map(wire_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn wire_message(message: &Message) -> WireMessage<'_> {
    WireMessage {
        role: message.role.as_str(),
        content: &message.content,
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

fn parse_response(
    provider_id: &str,
    requested_model: &str,
    body: &str,
) -> Result<LlmResponse, ProviderError> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("{provider_id}: {e}")))?;
    Ok(LlmResponse::new(
        wire.content,
        provider_id,
        wire.model.unwrap_or_else(|| requested_model.to_string()),
        Usage::new(wire.usage.input_tokens, wire.usage.output_tokens),
    ))
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.id
    }

    fn supports_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        debug!(provider = %self.id, model = %request.model, messages = request.messages.len(), "Sending generation request");

        let response = self
            .authorized(self.client.post(&self.api_url))
            .json(&Self::body(&request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(format!(
                "{} rejected the credentials (status {status})",
                self.id
            )));
        }

        let body = response.text().await.map_err(transport_error)?;
        if !(200..300).contains(&status) {
            warn!(provider = %self.id, status, body = %body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        parse_response(&self.id, &request.model, &body)
    }

    /// Any answer below 500 means the endpoint is reachable.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        let response = self
            .authorized(self.client.get(&self.api_url))
            .send()
            .await
            .map_err(transport_error)?;
        Ok(response.status().as_u16() < 500)
    }
}
