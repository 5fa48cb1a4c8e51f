//! `turnstream chat`: stream one turn from a running gateway.
//!
//! Prior turns are fetched from the gateway's history endpoint and sent
//! back as `messages`, so repeated calls with the same `--conversation`
//! continue one conversation.

use std::io::Write;

use clap::Args;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use turnstream_core::{ConversationId, StepEvent};
use turnstream_wire::{StreamOutcome, consume};

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Gateway base URL
    #[arg(long, env = "TURNSTREAM_URL", default_value = "http://127.0.0.1:3000")]
    pub url: String,

    /// Bearer token
    #[arg(long, env = "TURNSTREAM_TOKEN")]
    pub token: String,

    /// Conversation to continue (a new one is started when omitted)
    #[arg(long)]
    pub conversation: Option<String>,

    /// The message to send
    pub message: String,
}

pub async fn run(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = args.url.trim_end_matches('/');
    let conversation_id = args
        .conversation
        .map(ConversationId::from)
        .unwrap_or_default();
    let client = reqwest::Client::new();

    let history = fetch_history(&client, base, &args.token, &conversation_id).await?;
    let body = json!({
        "messages": history,
        "newMessage": args.message,
        "conversationId": conversation_id,
    });

    let response = client
        .post(format!("{base}/v1/chat/stream"))
        .bearer_auth(&args.token)
        .json(&body)
        .send()
        .await?;
    let response = check_status(response).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = consume(response.bytes_stream(), &cancel, print_event).await?;
    println!();

    match outcome {
        StreamOutcome::Completed => {
            eprintln!("[conversation {conversation_id}]");
            Ok(())
        }
        StreamOutcome::Failed(error) => Err(format!("run failed: {error}").into()),
        StreamOutcome::Incomplete => Err("stream ended before the run finished".into()),
        StreamOutcome::Cancelled => Err("cancelled".into()),
    }
}

async fn fetch_history(
    client: &reqwest::Client,
    base: &str,
    token: &str,
    conversation_id: &ConversationId,
) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let response = client
        .get(format!("{base}/v1/conversations/{conversation_id}/messages"))
        .bearer_auth(token)
        .send()
        .await?;
    let listing: Value = check_status(response).await?.json().await?;
    let history = history_from_listing(&listing);
    debug!(conversation_id = %conversation_id, messages = history.len(), "Fetched history");
    Ok(history)
}

/// Request-shaped `{role, content}` entries from a history listing. Only
/// human and assistant turns are replayed.
fn history_from_listing(listing: &Value) -> Vec<Value> {
    listing["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|m| {
            let role = match m["role"].as_str()? {
                "human" | "user" => "user",
                "assistant" => "assistant",
                _ => return None,
            };
            Some(json!({"role": role, "content": m["content"].as_str()?}))
        })
        .collect()
}

async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err("gateway rejected the token (401)".into());
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("gateway returned {status}: {body}").into());
    }
    Ok(response)
}

fn print_event(event: &StepEvent) {
    match event {
        StepEvent::Token { token } => {
            print!("{token}");
            let _ = std::io::stdout().flush();
        }
        StepEvent::ToolStart { tool, input, .. } => eprintln!("\n[tool] {tool} {input}"),
        StepEvent::ToolEnd { tool, output, .. } => eprintln!("[tool] {tool} -> {output}"),
        StepEvent::Error { error } => eprintln!("\n[error] {error}"),
        StepEvent::Connected | StepEvent::Done => {}
    }
}
