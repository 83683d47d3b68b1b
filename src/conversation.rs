//! Per-session conversation history, keyed by assistant label.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a conversation. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Append-only chat history for every assistant label in one session.
#[derive(Debug, Default)]
pub struct ConversationStore {
    order: Vec<String>,
    turns: HashMap<String, Vec<ChatTurn>>,
}

impl ConversationStore {
    /// Create a store with an empty history for each label.
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut store = Self::default();
        for label in labels {
            store.ensure_label(label.into());
        }
        store
    }

    fn ensure_label(&mut self, label: String) -> &mut Vec<ChatTurn> {
        if !self.turns.contains_key(&label) {
            self.order.push(label.clone());
        }
        self.turns.entry(label).or_default()
    }

    /// Append a turn to the end of `label`'s history.
    pub fn append(&mut self, label: &str, turn: ChatTurn) {
        self.ensure_label(label.to_string()).push(turn);
    }

    /// Append several turns in order.
    pub fn extend(&mut self, label: &str, turns: impl IntoIterator<Item = ChatTurn>) {
        self.ensure_label(label.to_string()).extend(turns);
    }

    /// Ordered history for `label`; empty if nothing was appended.
    pub fn history(&self, label: &str) -> &[ChatTurn] {
        self.turns.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Labels in initialisation order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "OSHA Hazard Violation";
    const B: &str = "RiskRadar: Job Safety Assessment App";

    #[test]
    fn starts_empty_for_known_labels() {
        let store = ConversationStore::new([A, B]);
        assert!(store.history(A).is_empty());
        assert!(store.history(B).is_empty());
        assert_eq!(store.labels().collect::<Vec<_>>(), vec![A, B]);
    }

    #[test]
    fn append_preserves_insertion_order() {
        let mut store = ConversationStore::new([A, B]);
        for i in 0..5 {
            store.append(A, ChatTurn::user(format!("msg {i}")));
        }
        let history = store.history(A);
        assert_eq!(history.len(), 5);
        for (i, turn) in history.iter().enumerate() {
            assert_eq!(turn.content, format!("msg {i}"));
        }
    }

    #[test]
    fn labels_are_isolated() {
        let mut store = ConversationStore::new([A, B]);
        store.append(A, ChatTurn::user("ping"));
        store.append(A, ChatTurn::assistant("OK"));
        store.append(B, ChatTurn::user("other"));

        assert_eq!(store.history(A).len(), 2);
        assert_eq!(store.history(B).len(), 1);
        assert!(store.history(B).iter().all(|t| t.content == "other"));
    }

    #[test]
    fn unknown_label_is_created_on_append() {
        let mut store = ConversationStore::new([A]);
        assert!(store.history("extra").is_empty());
        store.append("extra", ChatTurn::assistant("hi"));
        assert_eq!(store.history("extra").len(), 1);
        assert_eq!(store.labels().collect::<Vec<_>>(), vec![A, "extra"]);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(ChatTurn::assistant("x")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "x");
    }
}
