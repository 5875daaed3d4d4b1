//! Memory trait: the persistence collaborator.
//!
//! The engine never talks to a storage engine directly. It saves and resumes
//! conversation context, and reads/writes long-term key-value memory,
//! through [`MemoryStore`]. Implementations live in `ferroact-memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::MemoryError;
use crate::message::{ConversationId, Message};

/// Snapshot of a conversation as persisted between messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl ConversationContext {
    pub fn new(conversation_id: ConversationId, messages: Vec<Message>) -> Self {
        Self {
            conversation_id,
            messages,
            updated_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// The core MemoryStore trait.
///
/// Implementations: in-memory (tests and the CLI). Anything durable plugs in
/// behind the same five calls.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    async fn store_conversation_context(
        &self,
        id: &ConversationId,
        context: ConversationContext,
    ) -> std::result::Result<(), MemoryError>;

    async fn retrieve_conversation_context(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<ConversationContext>, MemoryError>;

    async fn store_long_term_memory(
        &self,
        key: &str,
        value: serde_json::Value,
        metadata: HashMap<String, String>,
    ) -> std::result::Result<(), MemoryError>;

    async fn retrieve_long_term_memory(
        &self,
        key: &str,
    ) -> std::result::Result<Option<serde_json::Value>, MemoryError>;

    /// Drop expired entries, returning how many were removed.
    async fn cleanup_expired_memory(&self) -> std::result::Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_serialization_skips_empty_metadata() {
        let ctx = ConversationContext::new("conv-1".into(), vec![Message::user("hi")]);
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("conv-1"));
        assert!(!json.contains("metadata"));
    }
}
