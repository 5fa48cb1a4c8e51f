//! In-memory store: useful for testing and single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use turnstream_core::{ConversationId, ConversationStore, Message, StoreError};

/// Conversations keyed by id, each an ordered list of messages.
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Vec<Message>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        let messages = conversations.entry(conversation_id.clone()).or_default();
        messages.push(message);
        debug!(conversation_id = %conversation_id, count = messages.len(), "Message stored");
        Ok(())
    }

    async fn list(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstream_core::Role;

    #[tokio::test]
    async fn append_then_list_preserves_order() {
        let store = InMemoryConversationStore::new();
        let id = ConversationId::from("c1");
        store.append(&id, Message::human("hi")).await.unwrap();
        store.append(&id, Message::assistant("hello")).await.unwrap();

        let messages = store.list(&id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Human);
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let store = InMemoryConversationStore::new();
        assert!(store.list(&ConversationId::from("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let store = InMemoryConversationStore::new();
        store.append(&"a".into(), Message::human("for a")).await.unwrap();
        store.append(&"b".into(), Message::human("for b")).await.unwrap();

        assert_eq!(store.conversation_count().await, 2);
        let a = store.list(&"a".into()).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "for a");
    }

    #[tokio::test]
    async fn content_is_stored_verbatim() {
        let store = InMemoryConversationStore::new();
        let id = ConversationId::from("c1");
        let text = "line one\n\nline two";
        store.append(&id, Message::assistant(text)).await.unwrap();
        assert_eq!(store.list(&id).await.unwrap()[0].content, text);
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let store = InMemoryConversationStore::new();
        let clone = store.clone();
        let id = ConversationId::from("c1");
        clone.append(&id, Message::human("hi")).await.unwrap();
        assert_eq!(store.list(&id).await.unwrap().len(), 1);
    }
}
