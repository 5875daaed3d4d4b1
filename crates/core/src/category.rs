//! Protected resource categories.
//!
//! Every outbound call is tagged with the category of the dependency it
//! reaches. The resilience layer keeps one set of bulkhead / breaker /
//! retry / time-limit settings per category, and a failure in one category
//! never affects another.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    /// Calls to a language-model provider.
    LlmProvider,
    /// Third-party HTTP services reached from tools.
    ExternalService,
    /// The persistence store.
    Database,
    /// Conversation-context and long-term memory operations.
    Memory,
    /// Tool bodies.
    ToolExecution,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 5] = [
        Self::LlmProvider,
        Self::ExternalService,
        Self::Database,
        Self::Memory,
        Self::ToolExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmProvider => "llm_provider",
            Self::ExternalService => "external_service",
            Self::Database => "database",
            Self::Memory => "memory",
            Self::ToolExecution => "tool_execution",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
