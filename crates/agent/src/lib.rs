//! The agent run driver.
//!
//! A run alternates between invoking the model and executing the tool
//! calls it requests:
//!
//! 1. **Window** the history to fit the cost budget ([`window`])
//! 2. **Annotate** up to two cache boundaries ([`cache`])
//! 3. **Invoke** the model and stream its tokens
//! 4. **If tool calls**: dispatch them concurrently ([`dispatcher`]),
//!    append the results, go back to step 1
//! 5. **If text**: emit `done`
//!
//! The loop is bounded by a maximum number of Agent→Tools round-trips.

pub mod cache;
pub mod dispatcher;
pub mod state_machine;
pub mod token;
pub mod window;

pub use cache::annotate;
pub use dispatcher::ToolDispatcher;
pub use state_machine::{AgentStateMachine, Phase, RunConfig, RunOutcome, RunState};
pub use token::{
    CostFn, ToolsCostFn, estimate_message_tokens, estimate_tools_tokens, message_count,
    uncharged_tools,
};
pub use window::{ConversationWindow, trim};
