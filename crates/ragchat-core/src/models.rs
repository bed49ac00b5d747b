//! Core data types shared by the retrieval pipeline and the chat loop.

use serde::{Deserialize, Serialize};

/// An immutable unit of retrievable content: one chunk of one document.
///
/// `source_id` is stable across re-ingestion (see [`crate::chunk::passage_id`]),
/// so the same physical chunk always lands on the same index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Chunk content.
    pub text: String,
    /// Unique, deterministic chunk identifier.
    pub source_id: String,
    /// Human-readable origin file name (e.g. `pricing_plans.txt`).
    pub origin: String,
    /// Ordinal position of this chunk within its origin document.
    pub position: usize,
}

/// A [`Passage`] paired with the similarity score of one search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    /// Higher is more similar.
    pub score: f32,
}

impl ScoredPassage {
    pub fn new(passage: Passage, score: f32) -> Self {
        Self { passage, score }
    }

    pub fn source_id(&self) -> &str {
        &self.passage.source_id
    }

    pub fn origin(&self) -> &str {
        &self.passage.origin
    }

    /// Score rendered the way it appears in context headers and citations.
    pub fn formatted_score(&self) -> String {
        format_score(self.score)
    }
}

/// Format a relevance score with three decimals.
pub fn format_score(score: f32) -> String {
    format!("{:.3}", score)
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message sent to a generation provider, or one stored conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A stored conversation turn. Only `User` and `Assistant` roles are recorded.
pub type ConversationTurn = ChatMessage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score_three_decimals() {
        assert_eq!(format_score(0.9), "0.900");
        assert_eq!(format_score(0.12345), "0.123");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
