//! Graceful degradation.
//!
//! Derives a [`SystemStatus`] from breaker states and produces substitute
//! content when a dependency is unavailable. Successful responses are cached
//! by the SHA-256 of their input so a later outage can replay them.
//!
//! The groups are judged differently. Providers are interchangeable through
//! failover, so the LLM group is down only once every provider breaker is
//! open. Every other instance serves requests nothing else can take, so one
//! open breaker marks its group down.

use chrono::{DateTime, Utc};
use ferroact_core::agent::{AgentResponse, ResponseStatus};
use ferroact_core::message::ConversationId;
use ferroact_core::provider::{LlmRequest, LlmResponse, Usage};
use ferroact_core::tool::{ToolCall, ToolResult};
use ferroact_core::ResourceCategory;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitState;
use crate::registry::ResilienceRegistry;

pub const FALLBACK_PROVIDER_ID: &str = "fallback";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Which dependency groups can currently take calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub llm_providers_operational: bool,
    pub external_services_operational: bool,
    pub database_operational: bool,
    pub tools_operational: bool,
}

impl SystemStatus {
    /// Fraction of dependency groups that are down, in [0, 1].
    pub fn degradation_level(&self) -> f64 {
        let flags = [
            self.llm_providers_operational,
            self.external_services_operational,
            self.database_operational,
            self.tools_operational,
        ];
        let down = flags.iter().filter(|ok| !**ok).count();
        down as f64 / flags.len() as f64
    }

    pub fn is_fully_operational(&self) -> bool {
        self.degradation_level() == 0.0
    }

    pub fn status_description(&self) -> &'static str {
        let level = self.degradation_level();
        if level == 0.0 {
            "Fully operational"
        } else if level <= 0.25 {
            "Minor degradation"
        } else if level <= 0.5 {
            "Partial degradation"
        } else if level <= 0.75 {
            "Major degradation"
        } else {
            "Severe degradation"
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub key: String,
    pub content: String,
    pub captured_at: DateTime<Utc>,
    stored: Instant,
}

impl CachedResponse {
    fn is_valid(&self, ttl: Duration) -> bool {
        self.stored.elapsed() < ttl
    }
}

pub struct DegradationService {
    registry: Arc<ResilienceRegistry>,
    cache: Mutex<HashMap<String, CachedResponse>>,
    ttl: Duration,
}

impl DegradationService {
    pub fn new(registry: Arc<ResilienceRegistry>) -> Self {
        Self {
            registry,
            cache: Mutex::new(HashMap::new()),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn registry(&self) -> &Arc<ResilienceRegistry> {
        &self.registry
    }

    // ── Status ──

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            llm_providers_operational: self.llm_operational(),
            external_services_operational: self
                .category_operational(ResourceCategory::ExternalService),
            database_operational: self.category_operational(ResourceCategory::Database),
            tools_operational: self.category_operational(ResourceCategory::ToolExecution),
        }
    }

    pub fn degradation_level(&self) -> f64 {
        self.system_status().degradation_level()
    }

    pub fn status_description(&self) -> &'static str {
        self.system_status().status_description()
    }

    /// A message suitable for showing to an end user.
    pub fn status_message(&self) -> String {
        let status = self.system_status();
        if status.is_fully_operational() {
            return "All systems operational.".to_string();
        }

        let mut down = Vec::new();
        if !status.llm_providers_operational {
            down.push("language model providers");
        }
        if !status.external_services_operational {
            down.push("external services");
        }
        if !status.database_operational {
            down.push("storage");
        }
        if !status.tools_operational {
            down.push("tools");
        }
        format!(
            "{}: {} temporarily unavailable. Responses may be limited.",
            status.status_description(),
            down.join(", ")
        )
    }

    /// Down only when every provider breaker is open.
    fn llm_operational(&self) -> bool {
        let breakers = self.registry.breakers_for(ResourceCategory::LlmProvider);
        breakers.is_empty() || breakers.iter().any(|b| b.state() != CircuitState::Open)
    }

    /// Down as soon as any single instance is open.
    fn category_operational(&self, category: ResourceCategory) -> bool {
        self.registry
            .breakers_for(category)
            .iter()
            .all(|b| b.state() != CircuitState::Open)
    }

    // ── Cache ──

    pub fn cache_key(input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }

    /// Store content for `input`. Expired entries are pruned here.
    pub fn cache_response(&self, input: &str, content: impl Into<String>) {
        let key = Self::cache_key(input);
        let mut cache = self.cache.lock();
        cache.retain(|_, entry| entry.is_valid(self.ttl));
        cache.insert(
            key.clone(),
            CachedResponse {
                key,
                content: content.into(),
                captured_at: Utc::now(),
                stored: Instant::now(),
            },
        );
    }

    pub fn cached_response(&self, input: &str) -> Option<CachedResponse> {
        let key = Self::cache_key(input);
        self.cache
            .lock()
            .get(&key)
            .filter(|entry| entry.is_valid(self.ttl))
            .cloned()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    // ── Fallback content ──

    pub fn fallback_llm_response(&self, request: &LlmRequest) -> LlmResponse {
        let input = request.last_user_message().unwrap_or_default();
        let content = match self.cached_response(input) {
            Some(cached) => {
                debug!(key = %cached.key, "Serving cached LLM response");
                cached.content
            }
            None => "I'm unable to reach a language model right now. Please try again in a few moments.".to_string(),
        };
        warn!(model = %request.model, "Serving fallback LLM response");

        let mut response = LlmResponse::new(content, FALLBACK_PROVIDER_ID, &request.model, Usage::default());
        response.from_fallback = true;
        response
    }

    pub fn fallback_agent_response(
        &self,
        conversation_id: &ConversationId,
        message: &str,
        reason: &str,
    ) -> AgentResponse {
        let content = match self.cached_response(message) {
            Some(cached) => cached.content,
            None => format!(
                "I can't complete this request right now. {}",
                self.status_message()
            ),
        };
        warn!(conversation_id = %conversation_id, reason, "Serving fallback agent response");

        AgentResponse {
            conversation_id: conversation_id.clone(),
            content,
            status: ResponseStatus::Failed,
            iterations: 0,
            observations: Vec::new(),
            usage: Usage::default(),
            degraded_reason: Some(reason.to_string()),
            timestamp: Utc::now(),
        }
    }

    /// Substitute result for a tool call that could not run.
    pub fn fallback_tool_result(&self, call: &ToolCall, reason: &str) -> ToolResult {
        let input = tool_cache_input(call);
        match self.cached_response(&input) {
            Some(cached) => {
                debug!(tool = %call.name, "Serving cached tool result");
                ToolResult::success(&call.name, serde_json::Value::String(cached.content), 0)
            }
            None => ToolResult::failure(
                &call.name,
                format!("Tool '{}' is temporarily unavailable: {reason}", call.name),
                0,
            ),
        }
    }

    pub fn cache_tool_result(&self, call: &ToolCall, result: &ToolResult) {
        if result.success {
            self.cache_response(&tool_cache_input(call), result.output_text());
        }
    }
}

fn tool_cache_input(call: &ToolCall) -> String {
    format!(
        "tool:{}:{}",
        call.name,
        serde_json::Value::Object(call.arguments.clone())
    )
}
