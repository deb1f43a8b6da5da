//! Chat message types.
//!
//! This module contains types for representing messages in a chat session,
//! including senders, content kinds, generation status, and the optimistic
//! attachment placeholders used before the backend confirms an upload.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// Represents the sender of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Message authored by the user.
    User,
    /// Message produced by the AI backend.
    #[default]
    Ai,
}

/// The kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Plain text.
    Text,
    /// Markdown-formatted text (AI answers).
    #[default]
    Markdown,
    /// Text accompanied by file attachments.
    File,
}

/// Generation lifecycle status of a message.
///
/// The backend omits the field for ordinary persisted messages, so the wire
/// default is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// A stream is currently populating this message.
    Generating,
    /// The message is finished.
    #[default]
    Completed,
    /// Generation was stopped before the backend finished.
    Interrupted,
    /// Generation failed; the content carries an error annotation.
    Error,
}

/// An attachment on a message.
///
/// A negative id together with a local preview URL denotes a client-minted
/// placeholder created for optimistic display; the preview resource is
/// released once the stream that carried the upload terminates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageFile {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_type: String,
}

/// A single message in a chat session.
///
/// Identifiers double as a generation-state tag: a negative id denotes a
/// client-minted message the backend has not yet confirmed (an optimistic
/// user message or an AI placeholder awaiting its first delta); a
/// non-negative id denotes a server-confirmed message. An id transitions
/// from negative to the server-assigned value exactly once, at stream
/// completion, and only for the record the stream is populating.
///
/// All fields are defaulted so that partial objects inside stream frames
/// (e.g. a `done` frame carrying only `{id}`) still decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    pub id: i64,
    /// Owning session id.
    pub session: i64,
    pub sender: Sender,
    /// Message content; grows by appended deltas while generating.
    pub content: String,
    pub content_type: ContentKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<MessageFile>,
    pub status: MessageStatus,
    /// Creation timestamp (ISO 8601 format).
    pub created_at: String,
    /// Optional reasoning trace; grows independently of `content`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl ChatMessage {
    /// Creates an optimistic user message with a client-minted id.
    pub fn user(
        id: i64,
        session: i64,
        content: impl Into<String>,
        content_type: ContentKind,
        files: Vec<MessageFile>,
    ) -> Self {
        Self {
            id,
            session,
            sender: Sender::User,
            content: content.into(),
            content_type,
            files,
            status: MessageStatus::Completed,
            created_at: chrono::Utc::now().to_rfc3339(),
            reasoning_content: None,
        }
    }

    /// Creates an empty AI placeholder awaiting its first delta.
    pub fn placeholder(id: i64, session: i64) -> Self {
        Self {
            id,
            session,
            sender: Sender::Ai,
            content: String::new(),
            content_type: ContentKind::Markdown,
            files: Vec::new(),
            status: MessageStatus::Generating,
            created_at: chrono::Utc::now().to_rfc3339(),
            reasoning_content: None,
        }
    }

    /// Returns true if this message has not been confirmed by the backend.
    pub fn is_local(&self) -> bool {
        self.id < 0
    }

    /// Returns true if neither content nor reasoning has accumulated.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self
                .reasoning_content
                .as_ref()
                .is_none_or(|r| r.is_empty())
    }
}

/// Mints client-local (negative) message identifiers.
///
/// Owned by the service that issues requests; deliberately not a process
/// global. Ids decrease monotonically: -1, -2, -3, ...
#[derive(Debug, Default)]
pub struct LocalIdGenerator {
    next: AtomicI64,
}

impl LocalIdGenerator {
    /// Creates a new generator starting at -1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next local id.
    pub fn next_id(&self) -> i64 {
        self.next.fetch_sub(1, Ordering::Relaxed) - 1
    }
}
