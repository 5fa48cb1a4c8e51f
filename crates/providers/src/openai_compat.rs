//! OpenAI-compatible streaming backend.
//!
//! Works with any endpoint that speaks `/chat/completions` with
//! `stream: true`: OpenAI, Gemini's OpenAI surface, OpenRouter, Ollama,
//! vLLM. Text deltas are forwarded as they arrive; tool call deltas are
//! accumulated by index and released once the response is complete.
//!
//! Cache-marked messages are sent as a single text content part carrying
//! `cache_control: {"type": "ephemeral"}`. Backends that do not know the
//! field ignore it.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use turnstream_config::ModelConfig;
use turnstream_core::{
    Message, ModelBackend, ModelEvent, ModelStream, Prompt, ProviderError, Role, ToolCall,
    ToolDefinition,
};

/// Events buffered between the HTTP reader task and the run driver.
const STREAM_BUFFER: usize = 64;

pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        // No overall timeout: a streamed answer may legitimately take minutes.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, ProviderError> {
        if config.provider != "openai_compat" {
            return Err(ProviderError::NotConfigured(format!(
                "unknown model provider '{}'",
                config.provider
            )));
        }
        Self::new(&config.provider, &config.base_url, config.api_key.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The JSON body for one streaming completion request.
    fn request_body(prompt: &Prompt) -> Value {
        let messages: Vec<ApiMessage> = prompt
            .messages
            .iter()
            .map(|m| ApiMessage::from_message(m, prompt.is_cached(m)))
            .collect();

        let mut body = json!({
            "model": prompt.model,
            "messages": messages,
            "temperature": prompt.temperature,
            "stream": true,
        });
        if let Some(max_tokens) = prompt.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !prompt.tools.is_empty() {
            body["tools"] = json!(to_api_tools(&prompt.tools));
        }
        body
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: Prompt) -> Result<ModelStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&prompt);
        debug!(
            backend = %self.name,
            model = %prompt.model,
            messages = prompt.messages.len(),
            cached = prompt.cache.len(),
            "Sending streaming request"
        );

        let mut request = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                return Err(ProviderError::RateLimited { retry_after_secs });
            }
            401 | 403 => {
                return Err(ProviderError::AuthenticationFailed(
                    "Invalid API key or insufficient permissions".into(),
                ));
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                warn!(status, body = %message, "Backend returned error");
                return Err(ProviderError::ApiError {
                    status_code: status,
                    message,
                });
            }
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let backend = self.name.clone();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = StreamDecoder::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                for token in decoder.feed(&chunk) {
                    if tx.send(Ok(ModelEvent::Token(token))).await.is_err() {
                        trace!(backend = %backend, "Receiver dropped, abandoning stream");
                        return;
                    }
                }
                if decoder.is_finished() {
                    break;
                }
            }

            if !decoder.is_complete() {
                warn!(backend = %backend, "Upstream stream ended without [DONE]");
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(
                        "upstream stream ended before [DONE]".into(),
                    )))
                    .await;
                return;
            }

            for call in decoder.finish() {
                if tx.send(Ok(ModelEvent::ToolCall(call))).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

/// Incremental decoder for the upstream event stream.
///
/// Splits on newlines at the byte level so multi-byte characters cut by a
/// chunk boundary survive intact.
#[derive(Default)]
struct StreamDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    finished: bool,
    finish_reason: Option<String>,
}

impl StreamDecoder {
    /// Feed raw bytes; returns the text deltas they complete.
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut tokens = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(data) = line.strip_prefix("data:") else {
                continue; // blank lines, comments, other fields
            };
            let data = data.trim();
            if data == "[DONE]" {
                self.finished = true;
                break;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(resp) => {
                    for choice in resp.choices {
                        if choice.finish_reason.is_some() {
                            self.finish_reason = choice.finish_reason;
                        }
                        if let Some(deltas) = choice.delta.tool_calls {
                            for delta in deltas {
                                self.accumulate(delta);
                            }
                        }
                        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                            tokens.push(content);
                        }
                    }
                }
                Err(e) => trace!(data = %data, error = %e, "Ignoring unparseable chunk"),
            }
        }
        tokens
    }

    fn accumulate(&mut self, delta: StreamToolCallDelta) {
        let acc = self.tool_calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            acc.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                acc.name = name;
            }
            if let Some(arguments) = function.arguments {
                acc.arguments.push_str(&arguments);
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the upstream signalled the end of the reply, by `[DONE]` or
    /// a `finish_reason`. Anything else means the body was cut short.
    fn is_complete(&self) -> bool {
        self.finished || self.finish_reason.is_some()
    }

    /// The assembled tool calls, in index order.
    fn finish(self) -> Vec<ToolCall> {
        self.tool_calls
            .into_values()
            .filter(|acc| !acc.name.is_empty())
            .map(ToolCallAccumulator::into_tool_call)
            .collect()
    }
}

#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> ToolCall {
        let input = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
                warn!(tool = %self.name, error = %e, "Tool arguments are not valid JSON");
                Value::String(self.arguments.clone())
            })
        };
        ToolCall {
            id: self.id,
            name: self.name,
            input,
        }
    }
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn from_message(message: &Message, cached: bool) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        let content = if cached {
            ApiContent::Parts(vec![ApiContentPart {
                r#type: "text",
                text: message.content.clone(),
                cache_control: Some(CacheControl {
                    r#type: "ephemeral",
                }),
            }])
        } else {
            ApiContent::Text(message.content.clone())
        };
        let tool_calls = message.has_tool_calls().then(|| {
            message
                .tool_calls
                .iter()
                .map(|tc| ApiToolCall {
                    id: tc.id.clone(),
                    r#type: "function",
                    function: ApiFunction {
                        name: tc.name.clone(),
                        arguments: tc.input.to_string(),
                    },
                })
                .collect()
        });
        Self {
            role,
            content,
            tool_calls,
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

#[derive(Debug, Serialize)]
struct ApiContentPart {
    r#type: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

/// A single `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call fragment; the id and name arrive once, arguments in pieces.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
