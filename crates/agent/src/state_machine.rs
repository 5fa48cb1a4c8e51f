//! AgentStateMachine: the single driver of one run.
//!
//! ```text
//!            tool calls               all results appended
//!   Agent ─────────────────► Tools ─────────────────────────► Agent
//!     │ text, no tool calls
//!     ▼
//!   Done            (any unrecoverable error, cancellation) ──► Failed
//! ```
//!
//! Only the driver writes to the event sink, so frames are strictly
//! ordered even while tool calls of one step execute concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use turnstream_config::AppConfig;
use turnstream_core::{
    ConversationId, Error, EventSink, Message, ModelBackend, ModelEvent, Prompt, ProviderError,
    Result, Role, StepEvent, ToolCall, ToolResult,
};

use crate::cache::annotate;
use crate::dispatcher::ToolDispatcher;
use crate::token::{CostFn, ToolsCostFn, estimate_message_tokens, estimate_tools_tokens};
use crate::window::trim;

/// How long a failing run may wait to deliver its `error` frame.
const ERROR_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Agent,
    Tools,
    Done,
    Failed,
}

/// Mutable state of one run. Created per incoming message, discarded once
/// terminal.
#[derive(Debug, Clone)]
pub struct RunState {
    pub conversation_id: ConversationId,
    pub phase: Phase,
    /// Append-only for the duration of the run.
    pub history: Vec<Message>,
    pub pending_tool_calls: Vec<ToolCall>,
    /// Completed Agent→Tools round-trips.
    pub iteration: u32,
}

impl RunState {
    pub fn new(conversation_id: ConversationId, history: Vec<Message>) -> Self {
        Self {
            conversation_id,
            phase: Phase::Agent,
            history,
            pending_tool_calls: Vec::new(),
            iteration: 0,
        }
    }
}

/// Per-run limits and prompt settings.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub model: String,
    /// Prepended to the window when the history carries no system message.
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub window_budget: usize,
    pub cost: CostFn,
    /// Charged against `window_budget` before the history is trimmed.
    pub tools_cost: ToolsCostFn,
    pub max_iterations: u32,
    pub tool_timeout: Duration,
    pub deadline: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: "default".into(),
            system_prompt: None,
            temperature: 0.7,
            max_output_tokens: None,
            window_budget: 8000,
            cost: estimate_message_tokens,
            tools_cost: estimate_tools_tokens,
            max_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            deadline: None,
        }
    }
}

impl RunConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.name.clone(),
            system_prompt: Some(config.model.system_prompt.clone()).filter(|s| !s.is_empty()),
            temperature: config.model.temperature,
            max_output_tokens: Some(config.model.max_output_tokens),
            window_budget: config.agent.window_budget,
            cost: estimate_message_tokens,
            tools_cost: estimate_tools_tokens,
            max_iterations: config.agent.max_iterations,
            tool_timeout: config.agent.tool_timeout(),
            deadline: config.agent.run_deadline(),
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    /// Every phase the run entered, in order, ending with `Done` or `Failed`.
    pub trace: Vec<Phase>,
    /// The final assistant message, or the error that ended the run.
    pub result: Result<Message>,
}

impl RunOutcome {
    pub fn is_done(&self) -> bool {
        self.state.phase == Phase::Done
    }

    pub fn reply(&self) -> Option<&Message> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }
}

pub struct AgentStateMachine {
    model: Arc<dyn ModelBackend>,
    dispatcher: ToolDispatcher,
    config: RunConfig,
}

impl AgentStateMachine {
    pub fn new(model: Arc<dyn ModelBackend>, dispatcher: ToolDispatcher, config: RunConfig) -> Self {
        Self {
            model,
            dispatcher,
            config,
        }
    }

    /// Drive `state` to a terminal phase, emitting every step event to
    /// `sink`.
    ///
    /// The run is cancelled when `cancel` fires or the configured deadline
    /// passes. A failed run emits exactly one `error` frame if the sink is
    /// still open, and never a `done` frame.
    pub async fn run<S>(
        &self,
        mut state: RunState,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> RunOutcome
    where
        S: EventSink + ?Sized,
    {
        let started = Instant::now();
        let deadline = self.config.deadline.map(|d| started + d);
        let preamble = self.config.system_prompt.as_deref().map(Message::system);
        let mut trace = Vec::new();

        info!(
            conversation_id = %state.conversation_id,
            history = state.history.len(),
            model = %self.config.model,
            backend = self.model.name(),
            "Run starting"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled("cancelled by caller".into())),
            _ = deadline_elapsed(deadline) => Err(Error::Cancelled("run deadline exceeded".into())),
            result = self.drive(&mut state, &mut *sink, &mut trace, preamble.as_ref()) => result,
        };

        match &result {
            Ok(_) => {
                state.phase = Phase::Done;
                info!(
                    conversation_id = %state.conversation_id,
                    iterations = state.iteration,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Run completed"
                );
            }
            Err(e) => {
                warn!(
                    conversation_id = %state.conversation_id,
                    phase = ?state.phase,
                    iteration = state.iteration,
                    kind = e.kind(),
                    error = %e,
                    "Run failed"
                );
                state.phase = Phase::Failed;
                if sink.is_open() {
                    let frame = StepEvent::Error {
                        error: e.to_string(),
                    };
                    match tokio::time::timeout(ERROR_FLUSH_TIMEOUT, sink.emit(frame)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(_)) | Err(_) => {
                            debug!(conversation_id = %state.conversation_id, "Error frame not delivered");
                        }
                    }
                }
            }
        }
        trace.push(state.phase);

        RunOutcome {
            state,
            trace,
            result,
        }
    }

    async fn drive<S>(
        &self,
        state: &mut RunState,
        sink: &mut S,
        trace: &mut Vec<Phase>,
        preamble: Option<&Message>,
    ) -> Result<Message>
    where
        S: EventSink + ?Sized,
    {
        sink.emit(StepEvent::Connected).await?;

        loop {
            trace.push(state.phase);
            match state.phase {
                Phase::Agent => {
                    let reply = self.agent_step(state, sink, preamble).await?;
                    state.history.push(reply.clone());

                    if !reply.has_tool_calls() {
                        sink.emit(StepEvent::Done).await?;
                        return Ok(reply);
                    }
                    if state.iteration >= self.config.max_iterations {
                        return Err(Error::RunExhausted {
                            max_iterations: self.config.max_iterations,
                        });
                    }
                    state.pending_tool_calls = reply.tool_calls;
                    state.phase = Phase::Tools;
                }
                Phase::Tools => {
                    self.tools_step(state, sink).await?;
                    state.iteration += 1;
                    state.phase = Phase::Agent;
                }
                Phase::Done | Phase::Failed => {
                    return Err(Error::Internal(format!(
                        "run is already {:?}",
                        state.phase
                    )));
                }
            }
        }
    }

    /// Window the history, invoke the model, stream its tokens, and
    /// assemble the reply.
    async fn agent_step<S>(
        &self,
        state: &RunState,
        sink: &mut S,
        preamble: Option<&Message>,
    ) -> Result<Message>
    where
        S: EventSink + ?Sized,
    {
        let tools = self.dispatcher.definitions();
        let budget = self
            .config
            .window_budget
            .saturating_sub((self.config.tools_cost)(&tools));
        let window = match preamble {
            Some(system) if !state.history.iter().any(|m| m.role == Role::System) => {
                let mut with_preamble = Vec::with_capacity(state.history.len() + 1);
                with_preamble.push(system.clone());
                with_preamble.extend_from_slice(&state.history);
                trim(&with_preamble, budget, self.config.cost)
            }
            _ => trim(&state.history, budget, self.config.cost),
        };
        if window.first_non_system().is_none() {
            warn!(
                conversation_id = %state.conversation_id,
                budget,
                "No conversation message fits the window budget"
            );
        }

        let cache = annotate(&window);
        let prompt = Prompt {
            model: self.config.model.clone(),
            messages: window.into_messages(),
            cache,
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        };
        debug!(
            conversation_id = %state.conversation_id,
            iteration = state.iteration,
            window = prompt.messages.len(),
            cached = prompt.cache.len(),
            "Invoking model"
        );

        let mut stream = self.model.invoke(prompt).await?;
        let mut content = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();

        while let Some(event) = stream.recv().await {
            match event? {
                ModelEvent::Token(token) => {
                    if token.is_empty() {
                        continue;
                    }
                    content.push_str(&token);
                    sink.emit(StepEvent::Token { token }).await?;
                }
                ModelEvent::ToolCall(mut call) => {
                    if call.id.is_empty() {
                        call.id = format!("call_{}_{}", state.iteration, calls.len());
                    }
                    calls.push(call);
                }
            }
        }

        if calls.is_empty() && content.is_empty() {
            return Err(ProviderError::EmptyResponse.into());
        }
        Ok(Message::assistant_with_calls(content, calls))
    }

    /// Dispatch every pending call concurrently and append the results in
    /// call order.
    async fn tools_step<S>(&self, state: &mut RunState, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        let calls = state.pending_tool_calls.clone();
        let timeout = self.config.tool_timeout;
        let mut tasks = JoinSet::new();

        for (index, call) in calls.iter().enumerate() {
            sink.emit(StepEvent::ToolStart {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                input: call.input.clone(),
            })
            .await?;

            let dispatcher = self.dispatcher.clone();
            let call = call.clone();
            tasks.spawn(async move { (index, dispatcher.dispatch(&call, timeout).await) });
        }

        let mut results: Vec<Option<ToolResult>> = vec![None; calls.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) =
                joined.map_err(|e| Error::Internal(format!("tool task failed: {e}")))?;
            let result = result?;
            let call = &calls[index];

            debug!(
                conversation_id = %state.conversation_id,
                tool = %call.name,
                call_id = %call.id,
                success = result.output.is_success(),
                "Tool finished"
            );
            sink.emit(StepEvent::ToolEnd {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                output: result.output.to_wire_value(),
            })
            .await?;
            results[index] = Some(result);
        }

        for (call, result) in calls.iter().zip(results) {
            let result = result
                .ok_or_else(|| Error::Internal(format!("no result for tool call {}", call.id)))?;
            state
                .history
                .push(Message::tool(call.id.clone(), result.output.to_content()));
        }
        state.pending_tool_calls.clear();
        Ok(())
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
