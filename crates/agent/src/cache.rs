//! CacheAnnotator: pick the messages a backend may cache up to.
//!
//! Two marks at most: the last message of the window, and the second most
//! recent human message. Content and order are never touched.

use turnstream_core::{CacheMark, Role};

use crate::window::ConversationWindow;

pub fn annotate(window: &ConversationWindow) -> CacheMark {
    let mut mark = CacheMark::new();
    let Some(last) = window.iter().next_back() else {
        return mark;
    };
    mark.insert(last.id.clone());

    let mut humans = 0;
    for message in window.iter().rev() {
        if message.role == Role::Human {
            humans += 1;
            if humans == 2 {
                mark.insert(message.id.clone());
                break;
            }
        }
    }
    mark
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::message_count;
    use crate::window::trim;
    use turnstream_core::Message;

    #[test]
    fn concrete_scenario_marks_last_and_second_human() {
        let history = vec![
            Message::system("be brief"),
            Message::human("hi"),
            Message::assistant("hello"),
            Message::human("what's 2+2"),
            Message::assistant("4"),
            Message::human("and 3+3"),
        ];
        let window = trim(&history, 4, message_count);
        let mark = annotate(&window);

        assert_eq!(mark.len(), 2);
        assert!(mark.contains(&history[5].id));
        assert!(mark.contains(&history[3].id));
    }

    #[test]
    fn empty_window_has_no_marks() {
        assert!(annotate(&ConversationWindow::default()).is_empty());
    }

    #[test]
    fn system_only_window_marks_system() {
        let system = Message::system("sys");
        let window = ConversationWindow {
            system: Some(system.clone()),
            messages: vec![],
        };
        let mark = annotate(&window);
        assert_eq!(mark.len(), 1);
        assert!(mark.contains(&system.id));
    }

    #[test]
    fn single_human_gets_one_mark() {
        let human = Message::human("hi");
        let window = ConversationWindow {
            system: None,
            messages: vec![human.clone()],
        };
        let mark = annotate(&window);
        assert_eq!(mark.len(), 1);
        assert!(mark.contains(&human.id));
    }

    #[test]
    fn last_message_not_human_still_marked() {
        let messages = vec![
            Message::human("one"),
            Message::assistant("a"),
            Message::human("two"),
            Message::assistant("b"),
            Message::tool("c1", "result"),
        ];
        let window = ConversationWindow {
            system: None,
            messages: messages.clone(),
        };
        let mark = annotate(&window);
        assert_eq!(mark.len(), 2);
        assert!(mark.contains(&messages[4].id));
        assert!(mark.contains(&messages[0].id));
    }

    #[test]
    fn marks_between_one_and_two_for_any_non_empty_window() {
        for n in 1..8 {
            let messages: Vec<Message> = (0..n)
                .map(|i| match i % 3 {
                    0 => Message::human(format!("h{i}")),
                    1 => Message::assistant(format!("a{i}")),
                    _ => Message::tool(format!("c{i}"), "x"),
                })
                .collect();
            let window = ConversationWindow {
                system: Some(Message::system("sys")),
                messages,
            };
            let before = window.clone();
            let mark = annotate(&window);
            assert!((1..=2).contains(&mark.len()), "window of {n}");
            assert_eq!(window, before);
        }
    }
}
