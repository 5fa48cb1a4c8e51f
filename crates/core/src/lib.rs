//! # turnstream core
//!
//! Domain types, capability traits, and error definitions for the
//! turnstream agent runtime. Every collaborator a run talks to (model
//! backend, tools, conversation store, authenticator, event sink) is a
//! trait here; implementations live in their own crates so tests can
//! swap in doubles.

pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod model;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError, TransportError};
pub use event::{EventSink, StepEvent};
pub use identity::{Authenticator, SubjectId};
pub use message::{ConversationId, Message, Role};
pub use model::{CacheMark, ModelBackend, ModelEvent, ModelStream, Prompt};
pub use store::ConversationStore;
pub use tool::{Tool, ToolCall, ToolDefinition, ToolOutput, ToolRegistry, ToolResult};
