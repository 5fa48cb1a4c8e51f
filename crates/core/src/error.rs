//! Error types for the turnstream domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! is what a run terminates with.

use thiserror::Error;

/// The top-level error type for a run and the surfaces around it.
///
/// `AuthRequired` and `InvalidRequest` are raised before any frame is
/// written. Everything else is surfaced mid-stream as exactly one
/// `error` frame.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Model invocation failed: {0}")]
    ModelInvocation(#[from] ProviderError),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    ToolTimeout { tool_name: String, timeout_ms: u64 },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ToolExecution { tool_name: String, reason: String },

    #[error("Transport closed by peer")]
    TransportClosed,

    #[error("Run exhausted: exceeded {max_iterations} agent/tool iterations")]
    RunExhausted { max_iterations: u32 },

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable, machine-readable name of the error kind (used in logs).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ModelInvocation(_) => "model_invocation_failure",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::ToolExecution { .. } => "tool_execution_failure",
            Self::TransportClosed => "transport_closed",
            Self::RunExhausted { .. } => "run_exhausted",
            Self::Cancelled(_) => "cancelled",
            Self::Store(_) => "store",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(name) => Self::ToolNotFound(name),
            ToolError::Timeout {
                tool_name,
                timeout_ms,
            } => Self::ToolTimeout {
                tool_name,
                timeout_ms,
            },
            ToolError::ExecutionFailed { tool_name, reason } => {
                Self::ToolExecution { tool_name, reason }
            }
            ToolError::InvalidArguments(reason) => Self::ToolExecution {
                tool_name: "unknown".into(),
                reason,
            },
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Closed => Self::TransportClosed,
            TransportError::Encode(reason) => {
                Self::Internal(format!("failed to encode frame: {reason}"))
            }
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    /// The event could not be encoded; the peer is still attached.
    #[error("Frame encoding failed: {0}")]
    Encode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
