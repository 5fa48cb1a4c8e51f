//! ConversationWindower: fit a growing history into a cost budget.
//!
//! The system message is always kept. The rest of the window is the
//! longest recent suffix of the history whose total cost fits in what the
//! system message leaves of the budget, widened backwards to the nearest
//! human message so a prompt never opens in the middle of a tool exchange.

use turnstream_core::{Message, Role};

/// The messages selected for one prompt. Borrows nothing from the source
/// history; the source is never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationWindow {
    pub system: Option<Message>,
    pub messages: Vec<Message>,
}

impl ConversationWindow {
    /// Total number of messages, system included.
    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// System message first, then the rest in history order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> {
        self.system.iter().chain(self.messages.iter())
    }

    pub fn first_non_system(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.system.into_iter().chain(self.messages).collect()
    }
}

/// Select the window for one prompt.
///
/// Only the first system message in `history` is treated as the system
/// message; any later one is dropped from the window.
pub fn trim<F>(history: &[Message], budget: usize, cost: F) -> ConversationWindow
where
    F: Fn(&Message) -> usize,
{
    let system = history.iter().find(|m| m.role == Role::System).cloned();
    let rest: Vec<&Message> = history.iter().filter(|m| m.role != Role::System).collect();

    let remaining = budget.saturating_sub(system.as_ref().map_or(0, &cost));

    let mut start = rest.len();
    let mut total = 0usize;
    for (i, message) in rest.iter().enumerate().rev() {
        let c = cost(*message);
        if total + c > remaining {
            break;
        }
        total += c;
        start = i;
    }

    if start < rest.len() && rest[start].role != Role::Human {
        match rest[..start].iter().rposition(|m| m.role == Role::Human) {
            Some(human) => start = human,
            // No human anywhere before: drop the leading exchange instead.
            None => {
                while start < rest.len() && rest[start].role != Role::Human {
                    start += 1;
                }
            }
        }
    }

    ConversationWindow {
        system,
        messages: rest[start..].iter().map(|m| (*m).clone()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{estimate_message_tokens, message_count};

    fn contents(window: &ConversationWindow) -> Vec<&str> {
        window.iter().map(|m| m.content.as_str()).collect()
    }

    fn scenario() -> Vec<Message> {
        vec![
            Message::system("be brief"),
            Message::human("hi"),
            Message::assistant("hello"),
            Message::human("what's 2+2"),
            Message::assistant("4"),
            Message::human("and 3+3"),
        ]
    }

    #[test]
    fn concrete_scenario_with_message_count_budget() {
        let window = trim(&scenario(), 4, message_count);
        assert_eq!(
            contents(&window),
            vec!["be brief", "what's 2+2", "4", "and 3+3"]
        );
    }

    #[test]
    fn large_budget_keeps_everything_in_order() {
        let history = scenario();
        let window = trim(&history, 100, message_count);
        assert_eq!(window.into_messages(), history);
    }

    #[test]
    fn source_history_is_untouched() {
        let history = scenario();
        let before = history.clone();
        let _ = trim(&history, 2, message_count);
        assert_eq!(history, before);
    }

    #[test]
    fn window_opening_on_tool_result_extends_to_human() {
        let history = vec![
            Message::human("what's 2+2"),
            Message::assistant_with_calls("", vec![]),
            Message::tool("call_1", "4"),
            Message::assistant("It's 4."),
        ];
        // Budget 2 would start at the tool message.
        let window = trim(&history, 2, message_count);
        assert_eq!(window.first_non_system().unwrap().role, Role::Human);
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn empty_history_yields_empty_window() {
        let window = trim(&[], 10, message_count);
        assert!(window.is_empty());
    }

    #[test]
    fn zero_budget_keeps_only_system() {
        let window = trim(&scenario(), 0, message_count);
        assert_eq!(contents(&window), vec!["be brief"]);
    }

    #[test]
    fn history_without_human_drops_leading_non_human() {
        let history = vec![Message::assistant("hello"), Message::tool("c", "x")];
        let window = trim(&history, 10, message_count);
        assert!(window.first_non_system().is_none());
    }

    #[test]
    fn token_cost_budget_drops_oldest() {
        let history = vec![
            Message::human("a".repeat(400)),
            Message::assistant("ok"),
            Message::human("next"),
            Message::assistant("done"),
        ];
        // "next" and "done" cost 5 each; "ok" would bring the total to 15.
        let window = trim(&history, 12, estimate_message_tokens);
        assert_eq!(contents(&window), vec!["next", "done"]);
    }

    #[test]
    fn first_non_system_is_never_assistant_or_tool() {
        let roles = [Role::Human, Role::Assistant, Role::Tool];
        // Every history of length 6 over three roles, every budget up to 7.
        for code in 0..3usize.pow(6) {
            let mut history = vec![Message::system("sys")];
            let mut c = code;
            for i in 0..6 {
                let message = match roles[c % 3] {
                    Role::Human => Message::human(format!("h{i}")),
                    Role::Assistant => Message::assistant(format!("a{i}")),
                    _ => Message::tool(format!("call{i}"), format!("t{i}")),
                };
                history.push(message);
                c /= 3;
            }
            for budget in 0..=7 {
                let window = trim(&history, budget, message_count);
                if let Some(first) = window.first_non_system() {
                    assert_eq!(first.role, Role::Human, "code {code} budget {budget}");
                }
                assert_eq!(window.system.as_ref().map(|m| m.content.as_str()), Some("sys"));
            }
        }
    }
}
