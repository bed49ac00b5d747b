//! Per-session conversation state.
//!
//! A [`Session`] holds the bounded turn history and whether the persona has
//! introduced itself. It is a plain value: the orchestrator borrows it
//! mutably for one exchange, so one session admits one in-flight exchange
//! while independent sessions run freely.

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, ConversationTurn, Role};

/// Maximum number of stored turns; older turns are dropped first.
pub const MAX_TURNS: usize = 20;

/// Number of most recent turns rendered into a prompt (three exchanges).
pub const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No completed exchange; the persona has not introduced itself.
    Fresh,
    /// The persona has introduced itself.
    Ongoing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    turns: Vec<ConversationTurn>,
    has_introduced: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Fresh` only before the first exchange of any kind; an apology turn
    /// counts as history.
    pub fn phase(&self) -> Phase {
        if self.has_introduced || !self.turns.is_empty() {
            Phase::Ongoing
        } else {
            Phase::Fresh
        }
    }

    pub fn has_introduced(&self) -> bool {
        self.has_introduced
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a user/assistant pair and trim to [`MAX_TURNS`].
    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.turns.push(ChatMessage::user(question));
        self.turns.push(ChatMessage::assistant(answer));
        if self.turns.len() > MAX_TURNS {
            let excess = self.turns.len() - MAX_TURNS;
            self.turns.drain(..excess);
        }
    }

    /// Flip `Fresh` to `Ongoing`. No-op once introduced.
    pub fn mark_introduced(&mut self) {
        self.has_introduced = true;
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Render the last [`HISTORY_WINDOW`] turns as `Customer:` / `Assistant:` lines.
    pub fn render_history(&self) -> String {
        self.recent(HISTORY_WINDOW)
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    Role::User => "Customer",
                    Role::Assistant | Role::System => "Assistant",
                };
                format!("{}: {}", speaker, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drop all history and return to [`Phase::Fresh`].
    pub fn clear(&mut self) {
        self.turns.clear();
        self.has_introduced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_to_most_recent() {
        let mut session = Session::new();
        for i in 0..11 {
            session.record_exchange(&format!("q{}", i), &format!("a{}", i));
        }
        assert_eq!(session.len(), MAX_TURNS);
        assert_eq!(session.turns()[0].content, "q1");
        assert_eq!(session.turns()[19].content, "a10");
    }

    #[test]
    fn test_history_renders_last_three_exchanges() {
        let mut session = Session::new();
        for i in 0..4 {
            session.record_exchange(&format!("q{}", i), &format!("a{}", i));
        }
        let history = session.render_history();
        assert!(!history.contains("q0"));
        assert!(history.starts_with("Customer: q1\nAssistant: a1"));
        assert!(history.ends_with("Customer: q3\nAssistant: a3"));
    }

    #[test]
    fn test_clear_resets_phase() {
        let mut session = Session::new();
        assert_eq!(session.phase(), Phase::Fresh);
        session.record_exchange("hi", "hello");
        session.mark_introduced();
        assert_eq!(session.phase(), Phase::Ongoing);

        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.phase(), Phase::Fresh);
        assert_eq!(session.render_history(), "");
    }

    #[test]
    fn test_any_history_ends_fresh_phase() {
        let mut session = Session::new();
        session.record_exchange("anything about kubernetes?", "I'm sorry");
        assert!(!session.has_introduced());
        assert_eq!(session.phase(), Phase::Ongoing);
    }
}
