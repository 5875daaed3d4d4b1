//! The ReAct engine.
//!
//! For each inbound message the engine runs THINKING → ACTING → OBSERVING
//! until the model gives a final answer or the iteration limit is hit:
//!
//! 1. **Think**: check the token budget, ask the provider manager for the
//!    next step, record usage, parse the step
//! 2. **Act**: run the requested tool through the tool executor
//! 3. **Observe**: fold the result into the transcript and loop
//!
//! Budget rejections and provider exhaustion end the turn with a degraded
//! response from the fallback layer. The engine never returns an error.

use chrono::Utc;
use ferroact_config::AppConfig;
use ferroact_core::ResourceCategory;
use ferroact_core::agent::{AgentResponse, MessageContext, ResponseStatus};
use ferroact_core::event::{DomainEvent, EventBus};
use ferroact_core::memory::{ConversationContext, MemoryStore};
use ferroact_core::message::{ConversationId, Message, Role};
use ferroact_core::provider::{LlmRequest, Usage};
use ferroact_core::tool::{ToolArgs, ToolCall, ToolDefinition, ToolResult};
use ferroact_providers::ProviderManager;
use ferroact_resilience::{DegradationService, ResilienceRegistry};
use ferroact_telemetry::{TelemetryError, TokenMonitor};
use ferroact_tools::ToolExecutor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::parser::{ActionInput, Step, parse_step};
use crate::state::{ReActState, StateError};
use crate::stream_event::AgentStreamEvent;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are FerroAct, a careful assistant that reasons step by step and uses tools when they help.";

const FORMAT_INSTRUCTIONS: &str = "\
Respond in this format:
Thought: your reasoning about what to do next
Action: the tool to use
Action Input: the tool arguments as a JSON object

You will then receive an Observation with the tool's result. When you can answer, respond with:
Thought: your final reasoning
Final Answer: the answer for the user";

const STREAM_BUFFER: usize = 64;

/// Engine settings, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
    /// Deadline for the whole loop of one message.
    pub conversation_timeout: Option<Duration>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Pin every call to one provider instead of priority failover.
    pub provider_id: Option<String>,
}

impl EngineConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.agent.max_iterations,
            system_prompt: config.agent.system_prompt.clone(),
            conversation_timeout: config.agent.conversation_timeout(),
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            provider_id: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_conversation_timeout(mut self, timeout: Duration) -> Self {
        self.conversation_timeout = Some(timeout);
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Callbacks invoked in loop order: thinking, action, observation, and
/// once at the end, the response.
pub struct StreamCallbacks {
    on_thinking: Box<dyn Fn(&str) + Send + Sync>,
    on_action: Box<dyn Fn(&ToolCall) + Send + Sync>,
    on_observation: Box<dyn Fn(&ToolResult) + Send + Sync>,
    on_response: Box<dyn Fn(&AgentResponse) + Send + Sync>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self {
            on_thinking: Box::new(|_| {}),
            on_action: Box::new(|_| {}),
            on_observation: Box::new(|_| {}),
            on_response: Box::new(|_| {}),
        }
    }

    pub fn on_thinking(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_thinking = Box::new(f);
        self
    }

    pub fn on_action(mut self, f: impl Fn(&ToolCall) + Send + Sync + 'static) -> Self {
        self.on_action = Box::new(f);
        self
    }

    pub fn on_observation(mut self, f: impl Fn(&ToolResult) + Send + Sync + 'static) -> Self {
        self.on_observation = Box::new(f);
        self
    }

    pub fn on_response(mut self, f: impl Fn(&AgentResponse) + Send + Sync + 'static) -> Self {
        self.on_response = Box::new(f);
        self
    }
}

impl Default for StreamCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

/// Working data for one inbound message.
struct Turn {
    state: ReActState,
    /// System prompt first, then resumed history, then this turn.
    messages: Vec<Message>,
    usage: Usage,
}

enum Outcome {
    Answer(String),
    /// Iteration limit reached without a final answer.
    Exhausted,
    /// Unrecoverable; the reason is surfaced on the response.
    Degraded(String),
}

pub struct ReactEngine {
    providers: Arc<ProviderManager>,
    tools: Arc<ToolExecutor>,
    monitor: Arc<TokenMonitor>,
    degradation: Arc<DegradationService>,
    memory: Option<Arc<dyn MemoryStore>>,
    events: Arc<EventBus>,
    config: EngineConfig,
    /// One lock per active conversation; iterations of a conversation never overlap.
    conversations: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReactEngine {
    pub fn new(
        providers: Arc<ProviderManager>,
        tools: Arc<ToolExecutor>,
        monitor: Arc<TokenMonitor>,
        degradation: Arc<DegradationService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            providers,
            tools,
            monitor,
            degradation,
            memory: None,
            events: Arc::new(EventBus::default()),
            config,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Resume and persist conversation history through `memory`.
    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn providers(&self) -> &Arc<ProviderManager> {
        &self.providers
    }

    pub fn tools(&self) -> &Arc<ToolExecutor> {
        &self.tools
    }

    pub fn monitor(&self) -> &Arc<TokenMonitor> {
        &self.monitor
    }

    pub fn degradation(&self) -> &Arc<DegradationService> {
        &self.degradation
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn registry(&self) -> &Arc<ResilienceRegistry> {
        self.degradation.registry()
    }

    // ── Entry points ──

    pub async fn process_message(
        &self,
        conversation_id: &ConversationId,
        message: &str,
        context: &MessageContext,
    ) -> AgentResponse {
        self.process_message_with_streaming(conversation_id, message, context, &StreamCallbacks::default())
            .await
    }

    pub async fn process_message_with_streaming(
        &self,
        conversation_id: &ConversationId,
        message: &str,
        context: &MessageContext,
        callbacks: &StreamCallbacks,
    ) -> AgentResponse {
        let lock = self.conversation_lock(conversation_id);
        let guard = lock.lock().await;

        if let Some(user_id) = &context.user_id {
            self.monitor.bind_conversation(conversation_id.as_str(), user_id);
        }
        self.events.publish(DomainEvent::MessageReceived {
            conversation_id: conversation_id.to_string(),
            content_preview: message.chars().take(80).collect(),
            timestamp: Utc::now(),
        });
        info!(conversation_id = %conversation_id, "Processing message");

        let mut turn = self.start_turn(conversation_id, message).await;

        let outcome = match self.config.conversation_timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.run_loop(&mut turn, callbacks)).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(conversation_id = %conversation_id, deadline_ms = deadline.as_millis() as u64, "Conversation deadline exceeded");
                        Ok(Outcome::Degraded("conversation deadline exceeded".into()))
                    }
                }
            }
            None => self.run_loop(&mut turn, callbacks).await,
        };
        let outcome = outcome.unwrap_or_else(|e| Outcome::Degraded(e.to_string()));

        let response = self.finish(message, turn, outcome).await;
        (callbacks.on_response)(&response);
        self.events.publish(DomainEvent::ConversationFinished {
            conversation_id: conversation_id.to_string(),
            status: response.status,
            iterations: response.iterations,
            timestamp: Utc::now(),
        });
        info!(
            conversation_id = %conversation_id,
            status = ?response.status,
            iterations = response.iterations,
            tokens = response.usage.total(),
            "Message processed"
        );

        if context.user_id.is_some() {
            self.monitor.unbind_conversation(conversation_id.as_str());
        }
        drop(guard);
        drop(lock);
        self.release_lock(conversation_id);
        response
    }

    /// Run the loop on a spawned task, yielding events as they happen.
    /// The final event is always [`AgentStreamEvent::Final`].
    pub fn process_message_stream(
        self: &Arc<Self>,
        conversation_id: ConversationId,
        message: String,
        context: MessageContext,
    ) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let callbacks = StreamCallbacks::new()
            .on_thinking({
                let tx = event_tx.clone();
                move |thought: &str| {
                    let _ = tx.send(AgentStreamEvent::Thinking {
                        content: thought.to_string(),
                    });
                }
            })
            .on_action({
                let tx = event_tx.clone();
                move |call: &ToolCall| {
                    let _ = tx.send(AgentStreamEvent::Action {
                        tool_name: call.name.clone(),
                        arguments: serde_json::Value::Object(call.arguments.clone()),
                    });
                }
            })
            .on_observation({
                let tx = event_tx.clone();
                move |result: &ToolResult| {
                    let _ = tx.send(AgentStreamEvent::Observation {
                        tool_name: result.tool_name.clone(),
                        output: result.output_text(),
                        success: result.success,
                        duration_ms: result.duration_ms,
                    });
                }
            })
            .on_response(move |response: &AgentResponse| {
                let _ = event_tx.send(AgentStreamEvent::from(response));
            });

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine
                .process_message_with_streaming(&conversation_id, &message, &context, &callbacks)
                .await;
        });

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    // ── The loop ──

    async fn run_loop(&self, turn: &mut Turn, callbacks: &StreamCallbacks) -> Result<Outcome, StateError> {
        let key = turn.state.conversation_id.to_string();

        while turn.state.has_iterations_left() {
            // THINKING
            let request = self.build_request(&turn.messages);
            let estimated: u64 = request
                .messages
                .iter()
                .map(|m| TokenMonitor::estimate_tokens(&m.content))
                .sum();

            if let Err(err) = self.monitor.ensure_within_budget(&key, estimated) {
                if let TelemetryError::BudgetExceeded { key, .. } = &err {
                    self.events.publish(DomainEvent::BudgetRejected {
                        key: key.clone(),
                        estimated_tokens: estimated,
                        timestamp: Utc::now(),
                    });
                }
                return Ok(Outcome::Degraded(err.to_string()));
            }

            let response = match self
                .providers
                .try_generate(&request, self.config.provider_id.as_deref())
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(conversation_id = %key, error = %e, "No provider produced a reasoning step");
                    return Ok(Outcome::Degraded(e.to_string()));
                }
            };

            self.monitor.track_token_usage(
                &key,
                u64::from(response.usage.input_tokens),
                u64::from(response.usage.output_tokens),
            );
            turn.usage.add(response.usage);
            self.events.publish(DomainEvent::ResponseGenerated {
                conversation_id: key.clone(),
                provider_id: response.provider_id.clone(),
                model: response.model.clone(),
                tokens_used: response.usage.total(),
                timestamp: Utc::now(),
            });

            turn.messages.push(Message::assistant(&response.content));
            let step = parse_step(&response.content);
            turn.state.current_thought = step.thought().map(str::to_string);
            if let Some(thought) = step.thought() {
                (callbacks.on_thinking)(thought);
            }

            let (tool, input) = match step {
                Step::Final { answer, .. } => {
                    turn.state.complete()?;
                    debug!(conversation_id = %key, iterations = turn.state.iteration_count(), "Final answer reached");
                    return Ok(Outcome::Answer(answer));
                }
                Step::Action { tool, input, .. } => (tool, input),
            };

            // ACTING
            let call = ToolCall::new(&tool, self.resolve_arguments(&tool, input));
            debug!(conversation_id = %key, tool = %call.name, iteration = turn.state.iteration_count(), "Dispatching tool");
            (callbacks.on_action)(&call);
            turn.state.begin_action(call.clone())?;
            let result = self.tools.run(&call).await;

            // OBSERVING
            (callbacks.on_observation)(&result);
            turn.messages
                .push(Message::observation(&result.tool_name, result.output_text()));
            turn.state.record_observation(result)?;
            turn.state.next_iteration()?;
        }

        warn!(
            conversation_id = %key,
            max_iterations = turn.state.max_iterations(),
            "Iteration limit reached without a final answer"
        );
        Ok(Outcome::Exhausted)
    }

    async fn finish(&self, message: &str, mut turn: Turn, outcome: Outcome) -> AgentResponse {
        let conversation_id = turn.state.conversation_id.clone();

        let (content, status, degraded_reason) = match outcome {
            Outcome::Answer(answer) => {
                self.degradation.cache_response(message, &answer);
                (answer, ResponseStatus::Complete, None)
            }
            Outcome::Exhausted => {
                let answer = best_effort_answer(&turn.state);
                turn.messages.push(Message::assistant(&answer));
                (answer, ResponseStatus::Partial, None)
            }
            Outcome::Degraded(reason) => {
                turn.state.fail();
                self.events.publish(DomainEvent::FallbackServed {
                    conversation_id: conversation_id.to_string(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                let fallback = self
                    .degradation
                    .fallback_agent_response(&conversation_id, message, &reason);
                (fallback.content, ResponseStatus::Failed, Some(reason))
            }
        };

        self.save_context(&conversation_id, &turn.messages).await;

        AgentResponse {
            conversation_id,
            content,
            status,
            iterations: turn.state.iteration_count(),
            usage: turn.usage,
            observations: turn.state.into_observations(),
            degraded_reason,
            timestamp: Utc::now(),
        }
    }

    // ── Context ──

    async fn start_turn(&self, conversation_id: &ConversationId, message: &str) -> Turn {
        let mut messages = vec![Message::system(self.system_prompt())];
        messages.extend(self.load_history(conversation_id).await);
        messages.push(Message::user(message));

        Turn {
            state: ReActState::new(conversation_id.clone(), self.config.max_iterations),
            messages,
            usage: Usage::default(),
        }
    }

    fn system_prompt(&self) -> String {
        let mut prompt = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        let tools = self.tools.get_available_tools();
        if !tools.is_empty() {
            prompt.push_str("\n\nYou can use these tools:\n");
            for tool in &tools {
                prompt.push_str("- ");
                prompt.push_str(&tool.describe());
                prompt.push('\n');
            }
        }
        prompt.push('\n');
        prompt.push_str(FORMAT_INSTRUCTIONS);
        prompt
    }

    fn build_request(&self, messages: &[Message]) -> LlmRequest {
        let request = LlmRequest::new(&self.config.model, messages.to_vec())
            .with_temperature(self.config.temperature);
        match self.config.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }

    /// Map a model's action input onto the tool's parameters. Plain text
    /// goes to the tool's only required parameter when it has one.
    fn resolve_arguments(&self, tool: &str, input: ActionInput) -> ToolArgs {
        match input {
            ActionInput::Args(args) => args,
            ActionInput::None => ToolArgs::new(),
            ActionInput::Text(text) => {
                let key = self
                    .tools
                    .get_available_tools()
                    .iter()
                    .find(|d| d.name == tool)
                    .and_then(text_parameter)
                    .unwrap_or_else(|| "input".to_string());
                let mut args = ToolArgs::new();
                args.insert(key, serde_json::Value::String(text));
                args
            }
        }
    }

    async fn load_history(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };

        let outcome = self
            .registry()
            .pipeline(ResourceCategory::Memory)
            .execute(|| {
                let memory = Arc::clone(memory);
                let id = conversation_id.clone();
                async move { memory.retrieve_conversation_context(&id).await }
            })
            .await;

        match outcome {
            Ok(Some(context)) => {
                debug!(conversation_id = %conversation_id, messages = context.messages.len(), "Resuming conversation");
                context
                    .messages
                    .into_iter()
                    .filter(|m| m.role != Role::System)
                    .collect()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Could not load conversation history");
                Vec::new()
            }
        }
    }

    async fn save_context(&self, conversation_id: &ConversationId, messages: &[Message]) {
        let Some(memory) = &self.memory else {
            return;
        };

        let history: Vec<Message> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect();

        let outcome = self
            .registry()
            .pipeline(ResourceCategory::Memory)
            .execute(|| {
                let memory = Arc::clone(memory);
                let id = conversation_id.clone();
                let context = ConversationContext::new(id.clone(), history.clone());
                async move { memory.store_conversation_context(&id, context).await }
            })
            .await;

        if let Err(e) = outcome {
            warn!(conversation_id = %conversation_id, error = %e, "Could not save conversation history");
        }
    }

    // ── Per-conversation serialization ──

    fn conversation_lock(&self, conversation_id: &ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.conversations
                .lock()
                .entry(conversation_id.clone())
                .or_default(),
        )
    }

    /// Forget the lock once no other caller holds it.
    fn release_lock(&self, conversation_id: &ConversationId) {
        let mut locks = self.conversations.lock();
        if locks
            .get(conversation_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(conversation_id);
        }
    }
}

fn text_parameter(definition: &ToolDefinition) -> Option<String> {
    let mut required = definition
        .parameters
        .iter()
        .filter(|(_, p)| p.required)
        .map(|(name, _)| name);
    match (required.next(), required.next()) {
        (Some(only), None) => Some(only.clone()),
        (None, None) if definition.parameters.len() == 1 => definition.parameters.keys().next().cloned(),
        _ => None,
    }
}

fn best_effort_answer(state: &ReActState) -> String {
    let best = state
        .current_thought
        .clone()
        .or_else(|| {
            state
                .observations()
                .iter()
                .rev()
                .find(|r| r.success)
                .map(|r| r.output_text())
        })
        .unwrap_or_else(|| "I wasn't able to work this out.".to_string());
    format!(
        "{best}\n\n(Stopped after {} steps without a final answer.)",
        state.max_iterations()
    )
}
