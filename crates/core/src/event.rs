//! Step events: what a run reports while it executes.
//!
//! A [`StepEvent`] is a closed set of variants. On the wire each one is a
//! JSON object tagged by its `type` field:
//!
//! - `connected`: the run has started
//! - `token`: partial text from the model
//! - `tool_start`: a tool call is about to be dispatched
//! - `tool_end`: a tool call finished (successfully or not)
//! - `error`: the run failed; nothing follows
//! - `done`: the run completed; nothing follows

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    Connected,

    Token {
        token: String,
    },

    ToolStart {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        call_id: String,
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    ToolEnd {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        call_id: String,
        tool: String,
        #[serde(default)]
        output: serde_json::Value,
    },

    Error {
        error: String,
    },

    Done,
}

impl StepEvent {
    /// Wire name of this event (the value of its `type` field).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Token { .. } => "token",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolEnd { .. } => "tool_end",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// `done` and `error` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// Where a run's events go. Exactly one sink per run, written only by the
/// driver.
#[async_trait]
pub trait EventSink: Send {
    /// Deliver one event, suspending while the sink applies backpressure.
    async fn emit(&mut self, event: StepEvent) -> Result<(), TransportError>;

    /// Whether a write could still succeed.
    fn is_open(&self) -> bool {
        true
    }
}

#[async_trait]
impl EventSink for Vec<StepEvent> {
    async fn emit(&mut self, event: StepEvent) -> Result<(), TransportError> {
        self.push(event);
        Ok(())
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<StepEvent> {
    async fn emit(&mut self, event: StepEvent) -> Result<(), TransportError> {
        self.send(event).await.map_err(|_| TransportError::Closed)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}
