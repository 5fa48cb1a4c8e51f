//! HTTP API v1.
//!
//! Endpoints (all behind bearer authentication):
//!
//! - `POST /v1/chat/stream`: run one turn, stream step events as frames
//! - `GET  /v1/conversations/{id}/messages`: stored messages, oldest first

use std::sync::Arc;

use axum::{
    Extension, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use turnstream_agent::RunState;
use turnstream_core::{
    ConversationId, ConversationStore, Error, Message, Role, StoreError, SubjectId,
};
use turnstream_wire::StreamTransportWriter;

use crate::SharedState;

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat/stream", post(chat_stream_handler))
        .route(
            "/conversations/{id}/messages",
            get(list_messages_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    /// Prior turns, oldest first.
    #[serde(default)]
    messages: Vec<RequestMessage>,
    new_message: String,
    #[serde(alias = "chatId")]
    conversation_id: String,
}

#[derive(Debug, Deserialize)]
struct RequestMessage {
    role: String,
    content: String,
}

impl ChatRequest {
    fn parse(body: &[u8]) -> Result<Self, Error> {
        let request: Self =
            serde_json::from_slice(body).map_err(|e| Error::InvalidRequest(e.to_string()))?;
        if request.new_message.trim().is_empty() {
            return Err(Error::InvalidRequest("newMessage must not be empty".into()));
        }
        if request.conversation_id.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "conversationId must not be empty".into(),
            ));
        }
        Ok(request)
    }

    /// The run history (prior turns plus the new human message) and the
    /// new message on its own for persistence.
    fn into_history(self) -> Result<(ConversationId, Vec<Message>, Message), Error> {
        let mut history = self
            .messages
            .into_iter()
            .map(|m| match m.role.as_str() {
                "user" | "human" => Ok(Message::human(m.content)),
                "assistant" => Ok(Message::assistant(m.content)),
                other => Err(Error::InvalidRequest(format!("unsupported role '{other}'"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let new_message = Message::human(self.new_message);
        history.push(new_message.clone());
        Ok((ConversationId(self.conversation_id), history, new_message))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub conversation_id: String,
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl From<Message> for StoredMessage {
    fn from(message: Message) -> Self {
        Self {
            role: message.role,
            content: message.content,
            timestamp: message.timestamp.to_rfc3339(),
        }
    }
}

/// Maps the error taxonomy onto HTTP statuses for failures raised before
/// a stream starts.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(Error::Store(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            Error::AuthRequired => StatusCode::UNAUTHORIZED.into_response(),
            Error::InvalidRequest(reason) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })).into_response()
            }
            other => {
                error!(kind = other.kind(), error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: other.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

// ── Chat stream ───────────────────────────────────────────────────────────

/// `POST /v1/chat/stream`: start a run and answer with its frame stream.
///
/// The run executes on its own task. Dropping the response body (client
/// disconnect) cancels it.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Extension(subject): Extension<SubjectId>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let (conversation_id, history, user_message) = ChatRequest::parse(&body)?.into_history()?;

    info!(
        conversation_id = %conversation_id,
        subject = %subject,
        history = history.len(),
        "Chat stream requested"
    );

    persist_detached(
        state.store.clone(),
        conversation_id.clone(),
        user_message,
    );

    let cancel = CancellationToken::new();
    let (mut writer, frames) = StreamTransportWriter::channel(state.stream_buffer);
    let frames = frames.cancel_on_drop(cancel.clone());

    let agent = state.agent.clone();
    let store = state.store.clone();
    tokio::spawn(async move {
        let run = RunState::new(conversation_id.clone(), history);
        let outcome = agent.run(run, &mut writer, &cancel).await;
        writer.close();
        match outcome.result {
            Ok(reply) => persist_detached(store, conversation_id, reply),
            Err(e) => debug!(
                conversation_id = %conversation_id,
                kind = e.kind(),
                "Run failed, reply not stored"
            ),
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(frames))
        .map_err(|e| ApiError(Error::Internal(e.to_string())))
}

/// Append `message` on a separate task. The streaming path never waits
/// for it.
fn persist_detached(
    store: Arc<dyn ConversationStore>,
    conversation_id: ConversationId,
    message: Message,
) {
    tokio::spawn(async move {
        let role = message.role;
        if let Err(e) = store.append(&conversation_id, message).await {
            warn!(
                conversation_id = %conversation_id,
                role = role.as_str(),
                store = store.name(),
                error = %e,
                "Failed to persist message"
            );
        }
    });
}

// ── Conversations ─────────────────────────────────────────────────────────

/// `GET /v1/conversations/{id}/messages`
async fn list_messages_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let conversation_id = ConversationId(id);
    let messages = state.store.list(&conversation_id).await?;
    Ok(Json(MessageListResponse {
        conversation_id: conversation_id.0,
        messages: messages.into_iter().map(StoredMessage::from).collect(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
