//! Shared test helpers for engine tests.

use ferroact_core::error::ProviderError;
use ferroact_core::provider::{LlmRequest, LlmResponse, Provider, Usage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `generate` returns the next scripted reply. With
/// `repeating`, the last reply is served forever; otherwise running out
/// panics.
pub struct SequentialMockProvider {
    name: String,
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    repeat_last: bool,
    delay: Option<Duration>,
    requests: Mutex<Vec<LlmRequest>>,
    call_count: AtomicUsize,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::scripted(replies.into_iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn scripted(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            name: "sequential_mock".into(),
            replies: Mutex::new(replies.into()),
            repeat_last: false,
            delay: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// A provider that answers directly.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text])
    }

    /// One tool call, then a final answer.
    pub fn tool_then_answer(tool: &str, input: serde_json::Value, answer: &str) -> Self {
        Self::scripted(vec![
            Ok(make_action(tool, input)),
            Ok(format!("Thought: I have what I need.\nFinal Answer: {answer}")),
        ])
    }

    /// Serve `text` on every call.
    pub fn always(text: &str) -> Self {
        let mut provider = Self::new(vec![text]);
        provider.repeat_last = true;
        provider
    }

    /// Fail every call with `error`.
    pub fn failing(error: ProviderError) -> Self {
        let mut provider = Self::scripted(vec![Err(error)]);
        provider.repeat_last = true;
        provider
    }

    #[allow(dead_code)]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self) -> Result<String, ProviderError> {
        let mut replies = self.replies.lock();
        match replies.len() {
            0 => panic!(
                "SequentialMockProvider: no more responses (call #{})",
                self.call_count()
            ),
            1 if self.repeat_last => replies[0].clone(),
            _ => replies.pop_front().unwrap(),
        }
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, ProviderError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = self.next_reply()?;
        Ok(LlmResponse::new(content, &self.name, &request.model, Usage::new(10, 5)))
    }
}

/// Render a ReAct action step.
pub fn make_action(tool: &str, input: serde_json::Value) -> String {
    format!("Thought: I should use {tool}.\nAction: {tool}\nAction Input: {input}")
}
