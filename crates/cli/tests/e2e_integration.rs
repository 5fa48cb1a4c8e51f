//! End-to-end integration tests for the turnstream runtime.
//!
//! These tests exercise the full pipeline: HTTP request → gateway →
//! agent state machine → encoder → bounded writer → response body →
//! frame parser, with a scripted model in place of a real backend.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use turnstream_agent::{AgentStateMachine, RunConfig, ToolDispatcher};
use turnstream_config::AppConfig;
use turnstream_core::{
    ModelBackend, ModelEvent, ModelStream, Prompt, ProviderError, StepEvent, ToolCall,
};
use turnstream_gateway::{GatewayState, SharedState, StaticTokenAuthenticator, build_router};
use turnstream_store::InMemoryConversationStore;
use turnstream_wire::{SseFrameParser, StreamOutcome, consume};

const TOKEN: &str = "e2e-token";

// ── Scripted model ───────────────────────────────────────────────────────

type Script = Vec<Result<ModelEvent, ProviderError>>;

/// Replays scripts in order; with `repeat`, the last one forever.
struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    calls: Mutex<usize>,
}

impl ScriptedModel {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            calls: Mutex::new(0),
        }
    }

    fn always(script: Script) -> Self {
        Self {
            repeat: Some(script),
            ..Self::new(vec![])
        }
    }
}

#[async_trait::async_trait]
impl ModelBackend for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_scripted"
    }

    async fn invoke(&self, _prompt: Prompt) -> Result<ModelStream, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.repeat.clone())
            .ok_or(ProviderError::EmptyResponse)?;
        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            tx.try_send(event).unwrap();
        }
        Ok(rx)
    }
}

/// Never yields; hands the sending half of each stream to the test.
struct StallingModel {
    senders: mpsc::UnboundedSender<mpsc::Sender<Result<ModelEvent, ProviderError>>>,
}

#[async_trait::async_trait]
impl ModelBackend for StallingModel {
    fn name(&self) -> &str {
        "e2e_stalling"
    }

    async fn invoke(&self, _prompt: Prompt) -> Result<ModelStream, ProviderError> {
        let (tx, rx) = mpsc::channel(1);
        let _ = self.senders.send(tx);
        Ok(rx)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn state_with(model: Arc<dyn ModelBackend>, config: RunConfig) -> SharedState {
    let dispatcher = ToolDispatcher::new(Arc::new(turnstream_tools::default_registry()), 4);
    let mut tokens = std::collections::BTreeMap::new();
    tokens.insert(TOKEN.to_string(), "e2e".to_string());
    Arc::new(GatewayState {
        agent: Arc::new(AgentStateMachine::new(model, dispatcher, config)),
        store: Arc::new(InMemoryConversationStore::new()),
        authenticator: Arc::new(StaticTokenAuthenticator::new(&tokens)),
        stream_buffer: 8,
    })
}

fn calculator_call(expression: &str) -> ModelEvent {
    ModelEvent::ToolCall(ToolCall {
        id: String::new(),
        name: "calculator".into(),
        input: json!({ "expression": expression }),
    })
}

fn chat_request(conversation_id: &str, message: &str) -> Request<Body> {
    let body = json!({
        "messages": [],
        "newMessage": message,
        "conversationId": conversation_id,
    });
    Request::builder()
        .method("POST")
        .uri("/v1/chat/stream")
        .header("Authorization", format!("Bearer {TOKEN}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Serve `state` on an ephemeral local port and return its base URL.
async fn spawn_server(state: SharedState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state, 1024 * 1024);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_tool_turn_over_real_http() {
    let model = ScriptedModel::new(vec![
        vec![
            Ok(ModelEvent::Token("Let me check. ".into())),
            Ok(calculator_call("6 * 7")),
        ],
        vec![
            Ok(ModelEvent::Token("The answer".into())),
            Ok(ModelEvent::Token(" is 42.".into())),
        ],
    ]);
    let base = spawn_server(state_with(Arc::new(model), RunConfig::default())).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/v1/chat/stream"))
        .bearer_auth(TOKEN)
        .json(&json!({"messages": [], "newMessage": "6 times 7?", "conversationId": "e2e-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );

    let mut events = Vec::new();
    let outcome = consume(
        response.bytes_stream(),
        &CancellationToken::new(),
        |e: &StepEvent| events.push(e.clone()),
    )
    .await
    .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    let types: Vec<&str> = events.iter().map(StepEvent::event_type).collect();
    assert_eq!(
        types,
        vec![
            "connected",
            "token",
            "tool_start",
            "tool_end",
            "token",
            "token",
            "done"
        ]
    );
    let StepEvent::ToolEnd { tool, output, .. } = &events[3] else {
        panic!("expected tool_end");
    };
    assert_eq!(tool, "calculator");
    assert_eq!(output, &json!("42"));
}

#[tokio::test]
async fn e2e_history_is_listed_after_the_turn() {
    let model = ScriptedModel::new(vec![vec![Ok(ModelEvent::Token("pong".into()))]]);
    let state = state_with(Arc::new(model), RunConfig::default());
    let base = spawn_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/v1/chat/stream"))
        .bearer_auth(TOKEN)
        .json(&json!({"messages": [], "newMessage": "ping", "conversationId": "e2e-2"}))
        .send()
        .await
        .unwrap();
    let outcome = consume(response.bytes_stream(), &CancellationToken::new(), |_: &StepEvent| {})
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);

    let mut listing = serde_json::Value::Null;
    for _ in 0..200 {
        listing = client
            .get(format!("{base}/v1/conversations/e2e-2/messages"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if listing["messages"].as_array().map_or(0, Vec::len) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let contents: Vec<&str> = listing["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["content"].as_str())
        .collect();
    assert_eq!(contents.len(), 2);
    assert!(contents.contains(&"ping"));
    assert!(contents.contains(&"pong"));
}

#[tokio::test]
async fn e2e_iteration_cap_ends_stream_with_error() {
    let model = ScriptedModel::always(vec![Ok(calculator_call("1 + 1"))]);
    let config = RunConfig {
        max_iterations: 2,
        ..RunConfig::default()
    };
    let app = build_router(state_with(Arc::new(model), config), 1024 * 1024);

    let response = app.oneshot(chat_request("e2e-3", "loop")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let events = SseFrameParser::new().feed(&body_bytes(response).await);

    let starts = events
        .iter()
        .filter(|e| matches!(e, StepEvent::ToolStart { .. }))
        .count();
    assert_eq!(starts, 2);
    let Some(StepEvent::Error { error }) = events.last() else {
        panic!("stream should end with an error frame");
    };
    assert!(error.contains("exhausted"));
    assert!(!events.contains(&StepEvent::Done));
}

#[tokio::test]
async fn e2e_byte_by_byte_delivery_yields_same_events() {
    let model = ScriptedModel::new(vec![
        vec![Ok(calculator_call("2 ^ 10"))],
        vec![Ok(ModelEvent::Token("1024, with \"quotes\"\n\nand blank lines".into()))],
    ]);
    let app = build_router(state_with(Arc::new(model), RunConfig::default()), 1024 * 1024);

    let response = app.oneshot(chat_request("e2e-4", "power")).await.unwrap();
    let body = body_bytes(response).await;
    let whole = SseFrameParser::new().feed(&body);

    let single_bytes = futures::stream::iter(
        body.iter()
            .map(|b| Ok::<_, Infallible>(Bytes::copy_from_slice(&[*b])))
            .collect::<Vec<_>>(),
    );
    let mut pieced = Vec::new();
    let outcome = consume(single_bytes, &CancellationToken::new(), |e: &StepEvent| {
        pieced.push(e.clone())
    })
    .await
    .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(pieced, whole);
    assert!(whole.contains(&StepEvent::Token {
        token: "1024, with \"quotes\"\n\nand blank lines".into()
    }));
}

#[tokio::test]
async fn e2e_dropping_the_response_cancels_the_run() {
    let (senders_tx, mut senders_rx) = mpsc::unbounded_channel();
    let model = StallingModel {
        senders: senders_tx,
    };
    let app = build_router(state_with(Arc::new(model), RunConfig::default()), 1024 * 1024);

    let response = app.oneshot(chat_request("e2e-5", "hang")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The run is now waiting on the model.
    let model_side = tokio::time::timeout(Duration::from_secs(5), senders_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!model_side.is_closed());

    drop(response);

    tokio::time::timeout(Duration::from_secs(5), model_side.closed())
        .await
        .expect("run should release the model stream after the client goes away");
}

#[tokio::test]
async fn e2e_unauthenticated_request_gets_no_frames() {
    let model = ScriptedModel::new(vec![]);
    let app = build_router(state_with(Arc::new(model), RunConfig::default()), 1024 * 1024);

    let req = Request::builder()
        .method("POST")
        .uri("/v1/chat/stream")
        .body(Body::from(
            json!({"newMessage": "hi", "conversationId": "x"}).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn e2e_gateway_from_config_file_accepts_configured_token() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[model]
name = "test-model"

[agent]
max_iterations = 3

[gateway.tokens]
"file-token" = "ops"
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.agent.max_iterations, 3);
    let state = Arc::new(GatewayState::from_config(&config).unwrap());
    let app = build_router(state, config.gateway.max_body_bytes);

    let req = Request::builder()
        .uri("/v1/conversations/none/messages")
        .header("Authorization", "Bearer file-token")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let req = Request::builder()
        .uri("/v1/conversations/none/messages")
        .header("Authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
