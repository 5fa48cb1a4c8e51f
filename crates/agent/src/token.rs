//! Cost functions for the conversation windower.
//!
//! Uses a character-based heuristic: ~4 characters per token. Close enough
//! for BPE tokenizers on English text, and predictable in tests.

use turnstream_core::{Message, ToolDefinition};

/// A message cost function, as taken by [`trim`](crate::window::trim).
pub type CostFn = fn(&Message) -> usize;

/// Cost of the tool definitions sent with every prompt, charged against
/// the window budget before the history is trimmed.
pub type ToolsCostFn = fn(&[ToolDefinition]) -> usize;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for role name and delimiters.
/// Tool call payloads count too since they are replayed to the model.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.input.to_string()))
        .sum();
    overhead + estimate_tokens(&message.content) + calls
}

/// Every message costs 1; the budget becomes a message count.
pub fn message_count(_message: &Message) -> usize {
    1
}

/// Estimate tokens for the tool definitions sent with every prompt.
pub fn estimate_tools_tokens(tools: &[ToolDefinition]) -> usize {
    tools
        .iter()
        .map(|t| serde_json::to_string(t).map_or(0, |json| estimate_tokens(&json)))
        .sum()
}

/// Tool definitions cost nothing. Pairs with [`message_count`].
pub fn uncharged_tools(_tools: &[ToolDefinition]) -> usize {
    0
}
