//! Tool registry and execution under the tool-execution pipeline.
//!
//! Every call is validated first, then runs inside the bulkhead and time
//! limiter of [`ResourceCategory::ToolExecution`]. Each tool has its own
//! breaker instance, so one misbehaving tool does not shut off the rest.

use chrono::Utc;
use ferroact_config::ToolsConfig;
use ferroact_core::ResourceCategory;
use ferroact_core::error::{ResilienceError, ToolError};
use ferroact_core::event::{DomainEvent, EventBus};
use ferroact_core::tool::{Tool, ToolArgs, ToolCall, ToolDefinition, ToolResult};
use ferroact_resilience::{CallError, DegradationService, ResilienceRegistry, RetryPolicy};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::validator::validate_arguments;

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    timeout: Option<Duration>,
}

pub struct ToolExecutor {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    registry: Arc<ResilienceRegistry>,
    degradation: Option<Arc<DegradationService>>,
    events: Option<Arc<EventBus>>,
    overrides: HashMap<String, Duration>,
    default_timeout: Duration,
}

impl ToolExecutor {
    /// Executor whose fallback timeout is the tool-execution category's.
    pub fn new(registry: Arc<ResilienceRegistry>) -> Self {
        let default_timeout = registry
            .config()
            .for_category(ResourceCategory::ToolExecution)
            .time_limiter
            .timeout();
        Self {
            tools: RwLock::new(HashMap::new()),
            registry,
            degradation: None,
            events: None,
            overrides: HashMap::new(),
            default_timeout,
        }
    }

    /// Apply per-tool overrides and the default timeout from `[tools]`.
    pub fn with_config(mut self, config: &ToolsConfig) -> Self {
        self.overrides = config
            .timeouts
            .iter()
            .map(|(name, ms)| (name.clone(), Duration::from_millis(*ms)))
            .collect();
        self.default_timeout = config.default_timeout();
        self
    }

    pub fn with_degradation(mut self, degradation: Arc<DegradationService>) -> Self {
        self.degradation = Some(degradation);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    // ── Registry ──

    /// Register a tool, replacing any tool with the same name.
    ///
    /// `timeout` takes precedence over every other timeout source.
    pub fn register_tool(&self, tool: Arc<dyn Tool>, timeout: Option<Duration>) {
        let name = tool.name().to_string();
        debug!(tool = %name, timeout_ms = timeout.map(|t| t.as_millis() as u64), "Tool registered");
        self.tools.write().insert(name, RegisteredTool { tool, timeout });
    }

    /// Definitions of all registered tools, sorted by name.
    pub fn get_available_tools(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .read()
            .values()
            .map(|r| r.tool.to_definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    pub fn is_async(&self, name: &str) -> bool {
        self.tools
            .read()
            .get(name)
            .is_some_and(|r| r.tool.is_async())
    }

    /// Effective timeout: registration, then `[tools.timeouts]`, then the
    /// tool's own declaration, then the default.
    pub fn effective_timeout(&self, name: &str) -> Option<Duration> {
        let tools = self.tools.read();
        let registered = tools.get(name)?;
        Some(self.resolve_timeout(name, registered))
    }

    fn resolve_timeout(&self, name: &str, registered: &RegisteredTool) -> Duration {
        registered
            .timeout
            .or_else(|| self.overrides.get(name).copied())
            .or_else(|| registered.tool.timeout())
            .unwrap_or(self.default_timeout)
    }

    // ── Execution ──

    /// Validate `args` and run the tool, waiting at most its timeout.
    pub async fn execute_tool(&self, name: &str, args: ToolArgs) -> Result<ToolResult, ToolError> {
        let (tool, limit) = {
            let tools = self.tools.read();
            let registered = tools
                .get(name)
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            (Arc::clone(&registered.tool), self.resolve_timeout(name, registered))
        };

        let args = validate_arguments(name, &tool.parameters(), args)?;

        let pipeline = self
            .registry
            .pipeline_for(ResourceCategory::ToolExecution, name)
            .with_timeout(limit)
            .with_retry(RetryPolicy::no_retry());

        let started = Instant::now();
        let outcome = pipeline
            .execute(|| {
                let tool = Arc::clone(&tool);
                let args = args.clone();
                async move { tool.execute(args).await }
            })
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(value) => Ok(ToolResult::success(name, value, elapsed_ms)),
            Err(CallError::Failed(err)) => Err(err),
            Err(CallError::Rejected(ResilienceError::DeadlineExceeded { limit_ms, .. })) => {
                Err(ToolError::Timeout {
                    tool_name: name.to_string(),
                    limit_ms,
                    elapsed_ms,
                })
            }
            Err(CallError::Rejected(rejection)) => Err(ToolError::Rejected {
                tool_name: name.to_string(),
                reason: rejection.to_string(),
            }),
        };

        match &result {
            Ok(_) => info!(tool = %name, duration_ms = elapsed_ms, "Tool executed"),
            Err(e) => warn!(tool = %name, duration_ms = elapsed_ms, error = %e, "Tool failed"),
        }
        self.publish(name, result.is_ok(), elapsed_ms);
        result
    }

    /// Run the tool on a spawned task.
    pub fn execute_tool_async(
        self: &Arc<Self>,
        name: &str,
        args: ToolArgs,
    ) -> JoinHandle<Result<ToolResult, ToolError>> {
        let this = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move { this.execute_tool(&name, args).await })
    }

    /// Execute `call`, folding every error into a failed [`ToolResult`].
    ///
    /// Async tools go through [`execute_tool_async`](Self::execute_tool_async).
    /// Rejected calls are answered by the degradation layer when one is set.
    pub async fn run(self: &Arc<Self>, call: &ToolCall) -> ToolResult {
        let started = Instant::now();
        let outcome = if self.is_async(&call.name) {
            match self.execute_tool_async(&call.name, call.arguments.clone()).await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(ToolError::failed(&call.name, format!("task aborted: {join_err}"))),
            }
        } else {
            self.execute_tool(&call.name, call.arguments.clone()).await
        };

        match outcome {
            Ok(result) => {
                if let Some(degradation) = &self.degradation {
                    degradation.cache_tool_result(call, &result);
                }
                result
            }
            Err(err) => {
                if let (ToolError::Rejected { reason, .. }, Some(degradation)) = (&err, &self.degradation) {
                    return degradation.fallback_tool_result(call, reason);
                }
                ToolResult::failure(&call.name, err.to_string(), started.elapsed().as_millis() as u64)
            }
        }
    }

    fn publish(&self, name: &str, success: bool, duration_ms: u64) {
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                tool_name: name.to_string(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }
    }
}
