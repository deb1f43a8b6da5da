//! Session domain model.
//!
//! A session is a persisted conversation: an ordered list of messages plus
//! identifying metadata. The full transcript (`ChatSession`) is what the
//! in-memory cache holds and what streaming generations mutate; the summary
//! form (`SessionSummary`) is what list endpoints return.

use serde::{Deserialize, Serialize};

use super::message::ChatMessage;

/// A session row as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub title: String,
    /// Creation timestamp (ISO 8601 format).
    pub created_at: String,
}

/// A full session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: i64,
    pub title: String,
    /// Creation timestamp (ISO 8601 format).
    pub created_at: String,
    /// Ordered message transcript.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Returns the position of the message with the given id, if present.
    pub fn position_of(&self, message_id: i64) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// Returns a reference to the message with the given id, if present.
    pub fn find_message(&self, message_id: i64) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Returns a mutable reference to the message with the given id.
    pub fn find_message_mut(&mut self, message_id: i64) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// Returns the last message in the transcript, if any.
    pub fn last_message_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.last_mut()
    }

    /// Returns a summary view of this session.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            title: self.title.clone(),
            created_at: self.created_at.clone(),
        }
    }
}
