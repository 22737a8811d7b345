//! Conversation state: the turn history kept per session.

use serde::{Deserialize, Serialize};

/// Default number of most-recent turns retained for prompt inclusion.
pub const DEFAULT_RETENTION: usize = 20;

/// Who produced a given [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user.
    User,
    /// The RAG Orchestrator's response.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn.
    pub role: Role,
    /// Turn content.
    pub text: String,
    /// Unix timestamp when the turn was recorded.
    pub timestamp: i64,
    /// Optional metadata (e.g. the assistant turn's message id, used by the
    /// feedback endpoint).
    pub metadata: Option<serde_json::Value>,
}

impl Turn {
    /// Creates a new turn stamped with the current time.
    #[must_use]
    pub fn new(role: Role, text: String) -> Self {
        Self {
            role,
            text,
            timestamp: current_timestamp(),
            metadata: None,
        }
    }

    /// Attaches metadata, returning `self` for chaining.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The append-only turn log for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    /// Opaque session identifier.
    pub session_id: String,
    /// Ordered turns, oldest first.
    pub turns: Vec<Turn>,
}

impl Conversation {
    /// Creates an empty conversation for `session_id`.
    #[must_use]
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            turns: Vec::new(),
        }
    }

    /// Appends a turn.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// The most recent `limit` turns, oldest first, for prompt inclusion.
    #[must_use]
    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    /// Drops turns older than `retention`, keeping only the most recent
    /// ones. Called after each append so stored history never grows
    /// unbounded beyond the retention window relevant to prompt assembly.
    pub fn truncate_to_retention(&mut self, retention: usize) {
        if self.turns.len() > retention {
            let drop = self.turns.len() - retention;
            self.turns.drain(0..drop);
        }
    }

    /// Number of turns currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether this conversation has no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[allow(clippy::cast_possible_wrap)]
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_push_and_recent() {
        let mut conversation = Conversation::new("s1".to_string());
        conversation.push(Turn::new(Role::User, "hello".to_string()));
        conversation.push(Turn::new(Role::Assistant, "hi".to_string()));
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.recent(1).len(), 1);
        assert_eq!(conversation.recent(10).len(), 2);
    }

    #[test]
    fn test_truncate_to_retention() {
        let mut conversation = Conversation::new("s1".to_string());
        for i in 0..25 {
            conversation.push(Turn::new(Role::User, format!("msg{i}")));
        }
        conversation.truncate_to_retention(DEFAULT_RETENTION);
        assert_eq!(conversation.len(), DEFAULT_RETENTION);
        assert_eq!(conversation.turns[0].text, "msg5");
    }

    #[test]
    fn test_empty_conversation() {
        let conversation = Conversation::new("s1".to_string());
        assert!(conversation.is_empty());
        assert!(conversation.recent(5).is_empty());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
