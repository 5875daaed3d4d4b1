//! Agent request context and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::message::ConversationId;
use crate::provider::Usage;
use crate::tool::ToolResult;

/// How a reply was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The model gave a final answer.
    Complete,
    /// Iteration limit hit; the answer is best-effort.
    Partial,
    /// Unrecoverable error; the content is a fallback message.
    Failed,
}

/// Per-request caller context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContext {
    /// Budget owner. When absent, usage is charged to the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl MessageContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            metadata: HashMap::new(),
        }
    }
}

/// What the engine hands back for every inbound message. Never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub conversation_id: ConversationId,
    pub content: String,
    pub status: ResponseStatus,
    pub iterations: u32,
    #[serde(default)]
    pub observations: Vec<ToolResult>,
    #[serde(default)]
    pub usage: Usage,
    /// Why the response is degraded, when it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentResponse {
    pub fn is_complete(&self) -> bool {
        self.status == ResponseStatus::Complete
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some()
    }
}
