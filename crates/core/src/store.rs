//! ConversationStore trait: the persistence collaborator.
//!
//! A run hands the store at most two messages: the user message when the
//! run starts and the final assistant message when it completes. Nothing
//! in the streaming path waits on these writes.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{ConversationId, Message};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Append a message to the end of a conversation.
    async fn append(&self, conversation_id: &ConversationId, message: Message)
    -> Result<(), StoreError>;

    /// All messages of a conversation, oldest first. Unknown conversations
    /// are empty.
    async fn list(&self, conversation_id: &ConversationId) -> Result<Vec<Message>, StoreError>;
}
