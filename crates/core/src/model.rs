//! ModelBackend trait: the abstraction over language model backends.
//!
//! A backend receives a fully built [`Prompt`] and answers with a stream
//! of [`ModelEvent`]s: text tokens as they are generated, and tool call
//! requests once they are complete.
//!
//! Implementations: OpenAI-compatible endpoints (see `turnstream-providers`),
//! scripted doubles in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::{ToolCall, ToolDefinition};

/// The set of message ids flagged cache-eligible for one prompt.
///
/// Recomputed every step, never persisted. Holds at most
/// [`CacheMark::MAX_MARKS`] ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMark(BTreeSet<String>);

impl CacheMark {
    pub const MAX_MARKS: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    /// Flag a message id. Returns `false` if the mark is already full.
    pub fn insert(&mut self, message_id: impl Into<String>) -> bool {
        let id = message_id.into();
        if self.0.contains(&id) {
            return true;
        }
        if self.0.len() >= Self::MAX_MARKS {
            return false;
        }
        self.0.insert(id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.0.contains(message_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Everything a backend needs for one model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// The model to use (e.g., "gemini-2.0-flash", "gpt-4o")
    pub model: String,

    /// System preamble followed by the conversation window, in order.
    pub messages: Vec<Message>,

    /// Messages the backend may treat as reusable prefix boundaries.
    #[serde(default)]
    pub cache: CacheMark,

    /// Tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Prompt {
    pub fn is_cached(&self, message: &Message) -> bool {
        self.cache.contains(&message.id)
    }
}

/// One incremental event from a streaming model invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// A text token.
    Token(String),
    /// A complete tool call request.
    ToolCall(ToolCall),
}

/// The receiving half of a streaming invocation. The stream ends when the
/// sender is dropped.
pub type ModelStream = tokio::sync::mpsc::Receiver<Result<ModelEvent, ProviderError>>;

/// The core ModelBackend trait.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai_compat").
    fn name(&self) -> &str;

    /// Start a streaming invocation.
    ///
    /// An `Err` here means the invocation never started; failures after
    /// that arrive as `Err` items on the stream.
    async fn invoke(&self, prompt: Prompt) -> Result<ModelStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_mark_holds_at_most_two() {
        let mut mark = CacheMark::new();
        assert!(mark.insert("a"));
        assert!(mark.insert("b"));
        assert!(!mark.insert("c"));
        assert!(mark.insert("a"));
        assert_eq!(mark.len(), 2);
        assert!(!mark.contains("c"));
    }

    #[test]
    fn prompt_reports_cached_messages() {
        let cached = Message::human("hi");
        let plain = Message::assistant("hello");
        let mut cache = CacheMark::new();
        cache.insert(cached.id.clone());
        let prompt = Prompt {
            model: "m".into(),
            messages: vec![cached.clone(), plain.clone()],
            cache,
            tools: vec![],
            temperature: default_temperature(),
            max_tokens: None,
        };
        assert!(prompt.is_cached(&cached));
        assert!(!prompt.is_cached(&plain));
    }
}
