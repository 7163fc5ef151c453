//! Conversation session: the ordered message history of one conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Message;

/// Ordered conversation history.
///
/// Mutated only by the orchestration loop. Messages are append-only; the
/// whole session can be replaced with [`Session::reset`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a completed turn in one step.
    pub(crate) fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Owned copy of the history for readers outside the loop.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Start a fresh conversation: new identity, empty history.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_replaces_identity_and_history() {
        let mut session = Session::new();
        let old_id = session.id();
        session.extend([Message::user("hello"), Message::assistant("hi")]);
        assert_eq!(session.len(), 2);

        session.reset();
        assert!(session.is_empty());
        assert_ne!(session.id(), old_id);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut session = Session::new();
        session.extend([Message::user("one")]);
        let snapshot = session.snapshot();
        session.extend([Message::assistant("two")]);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(session.last().map(|m| m.text()), Some("two"));
    }
}
