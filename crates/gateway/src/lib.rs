//! HTTP gateway for turnstream.
//!
//! Exposes the streamed chat endpoint, conversation history, and a health
//! check. Every `/v1` route requires `Authorization: Bearer <token>`.
//!
//! Built on Axum; frames are written through a bounded
//! [`turnstream_wire::StreamTransportWriter`] straight into the response
//! body.

pub mod api_v1;
pub mod auth;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{Json, Response};
use axum::{Router, routing::get};
use serde::Serialize;
use tracing::{info, warn};

use turnstream_agent::{AgentStateMachine, RunConfig, ToolDispatcher};
use turnstream_config::AppConfig;
use turnstream_core::{Authenticator, ConversationStore, Error, ProviderError};
use turnstream_store::InMemoryConversationStore;

pub use api_v1::ApiError;
pub use auth::StaticTokenAuthenticator;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agent: Arc<AgentStateMachine>,
    pub store: Arc<dyn ConversationStore>,
    pub authenticator: Arc<dyn Authenticator>,
    /// Capacity of each run's outbound frame buffer.
    pub stream_buffer: usize,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Build the model backend, tool registry, store and authenticator
    /// described by `config`. Everything is built once and shared by all
    /// runs.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let backend = turnstream_providers::build_backend(&config.model)?;
        let tools = Arc::new(turnstream_tools::default_registry());
        let dispatcher = ToolDispatcher::new(tools, config.agent.tool_concurrency);
        let agent = AgentStateMachine::new(backend, dispatcher, RunConfig::from_config(config));

        Ok(Self {
            agent: Arc::new(agent),
            store: Arc::new(InMemoryConversationStore::new()),
            authenticator: Arc::new(StaticTokenAuthenticator::new(&config.gateway.tokens)),
            stream_buffer: config.gateway.stream_buffer,
        })
    }
}

/// Build the full router.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(state: SharedState, max_body_bytes: usize) -> Router {
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if config.gateway.tokens.is_empty() {
        warn!("No bearer tokens configured; every /v1 request will be rejected");
    }
    if config.model.api_key.is_none() {
        warn!(base_url = %config.model.base_url, "No model API key configured");
    }

    let state = Arc::new(GatewayState::from_config(&config)?);
    let app = build_router(state, config.gateway.max_body_bytes);

    info!(
        addr = %addr,
        model = %config.model.name,
        max_iterations = config.agent.max_iterations,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Resolves the bearer credential to a [`turnstream_core::SubjectId`] and
/// stores it as a request extension. Anything else is a 401 with an empty
/// body, before any frame is written.
async fn auth_middleware(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let subject = state
        .authenticator
        .authenticate(auth::bearer_credential(header));

    let Some(subject) = subject else {
        warn!(path = %req.uri().path(), "Unauthorized request to /v1 API");
        return Err(Error::AuthRequired.into());
    };

    req.extensions_mut().insert(subject);
    Ok(next.run(req).await)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedModel, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(test_state(ScriptedModel::new(vec![])), 1024 * 1024)
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized_with_empty_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/stream")
            .body(Body::from(r#"{"newMessage":"hi","conversationId":"c"}"#))
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn wrong_token_is_unauthorized() {
        let req = Request::builder()
            .uri("/v1/conversations/c/messages")
            .header("Authorization", "Bearer not-the-token")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_is_checked_before_the_body() {
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/stream")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn state_builds_from_default_config() {
        let state = GatewayState::from_config(&AppConfig::default()).unwrap();
        assert_eq!(state.stream_buffer, 1024);
        assert_eq!(state.store.name(), "in_memory");
    }
}
