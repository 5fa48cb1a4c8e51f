//! Conversation stores.
//!
//! Only an in-memory store ships with turnstream. Anything durable plugs in
//! through [`turnstream_core::ConversationStore`].

pub mod in_memory;

pub use in_memory::InMemoryConversationStore;
