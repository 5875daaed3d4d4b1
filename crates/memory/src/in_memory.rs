//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use ferroact_core::error::MemoryError;
use ferroact_core::memory::{ConversationContext, MemoryStore};
use ferroact_core::message::ConversationId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct LongTermEntry {
    value: serde_json::Value,
    metadata: HashMap<String, String>,
    stored: Instant,
}

/// Keeps conversation contexts and long-term entries in process memory.
/// Entries older than the TTL are dropped by `cleanup_expired_memory`.
pub struct InMemoryStore {
    contexts: Arc<RwLock<HashMap<String, (ConversationContext, Instant)>>>,
    long_term: Arc<RwLock<HashMap<String, LongTermEntry>>>,
    ttl: Duration,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(86_400))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            contexts: Arc::new(RwLock::new(HashMap::new())),
            long_term: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn conversation_count(&self) -> usize {
        self.contexts.read().await.len()
    }

    /// Metadata stored alongside a long-term entry.
    pub async fn long_term_metadata(&self, key: &str) -> Option<HashMap<String, String>> {
        self.long_term
            .read()
            .await
            .get(key)
            .map(|e| e.metadata.clone())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store_conversation_context(
        &self,
        id: &ConversationId,
        context: ConversationContext,
    ) -> Result<(), MemoryError> {
        self.contexts
            .write()
            .await
            .insert(id.as_str().to_string(), (context, Instant::now()));
        Ok(())
    }

    async fn retrieve_conversation_context(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationContext>, MemoryError> {
        let contexts = self.contexts.read().await;
        Ok(contexts
            .get(id.as_str())
            .filter(|(_, stored)| stored.elapsed() < self.ttl)
            .map(|(ctx, _)| ctx.clone()))
    }

    async fn store_long_term_memory(
        &self,
        key: &str,
        value: serde_json::Value,
        metadata: HashMap<String, String>,
    ) -> Result<(), MemoryError> {
        if key.is_empty() {
            return Err(MemoryError::Storage("long-term memory key must not be empty".into()));
        }
        self.long_term.write().await.insert(
            key.to_string(),
            LongTermEntry {
                value,
                metadata,
                stored: Instant::now(),
            },
        );
        Ok(())
    }

    async fn retrieve_long_term_memory(
        &self,
        key: &str,
    ) -> Result<Option<serde_json::Value>, MemoryError> {
        let entries = self.long_term.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.stored.elapsed() < self.ttl)
            .map(|e| e.value.clone()))
    }

    async fn cleanup_expired_memory(&self) -> Result<usize, MemoryError> {
        let mut removed = 0;
        {
            let mut contexts = self.contexts.write().await;
            let before = contexts.len();
            contexts.retain(|_, (_, stored)| stored.elapsed() < self.ttl);
            removed += before - contexts.len();
        }
        {
            let mut entries = self.long_term.write().await;
            let before = entries.len();
            entries.retain(|_, e| e.stored.elapsed() < self.ttl);
            removed += before - entries.len();
        }
        if removed > 0 {
            tracing::debug!(removed, "Expired memory cleaned up");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferroact_core::message::Message;
    use serde_json::json;

    #[tokio::test]
    async fn store_and_retrieve_context() {
        let mem = InMemoryStore::new();
        let id = ConversationId::from("conv-1");
        let ctx = ConversationContext::new(id.clone(), vec![Message::user("hello")]);

        mem.store_conversation_context(&id, ctx).await.unwrap();
        let loaded = mem.retrieve_conversation_context(&id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "hello");

        let missing = mem
            .retrieve_conversation_context(&ConversationId::from("other"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn long_term_roundtrip_keeps_metadata() {
        let mem = InMemoryStore::new();
        let metadata = HashMap::from([("source".to_string(), "test".to_string())]);
        mem.store_long_term_memory("pref", json!({"lang": "rust"}), metadata)
            .await
            .unwrap();

        assert_eq!(
            mem.retrieve_long_term_memory("pref").await.unwrap(),
            Some(json!({"lang": "rust"}))
        );
        assert_eq!(
            mem.long_term_metadata("pref").await.unwrap()["source"],
            "test"
        );
    }

    #[tokio::test]
    async fn empty_key_rejected() {
        let mem = InMemoryStore::new();
        let err = mem
            .store_long_term_memory("", json!(1), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_removes_expired_entries() {
        let mem = InMemoryStore::with_ttl(Duration::from_secs(60));
        let id = ConversationId::from("conv-1");
        mem.store_conversation_context(&id, ConversationContext::new(id.clone(), vec![]))
            .await
            .unwrap();
        mem.store_long_term_memory("k", json!(1), HashMap::new())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(mem.retrieve_conversation_context(&id).await.unwrap().is_none());

        let fresh = ConversationId::from("conv-2");
        mem.store_conversation_context(&fresh, ConversationContext::new(fresh.clone(), vec![]))
            .await
            .unwrap();

        assert_eq!(mem.cleanup_expired_memory().await.unwrap(), 2);
        assert_eq!(mem.conversation_count().await, 1);
    }
}
