//! Backend gateway trait.
//!
//! Defines the interface for talking to the chat backend, decoupling the
//! application layer from the concrete HTTP transport. Plain CRUD endpoints
//! return decoded entities; the two generation endpoints return the raw
//! response body as a byte stream, which the caller feeds through the frame
//! parser.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::Result;

use super::model::{ChatSession, SessionSummary};

/// A streamed response body delivered in arbitrarily-sized chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A file to upload alongside a message.
///
/// `preview_url` is a caller-supplied local resource (e.g. an object URL)
/// shown while the upload is in flight; the service reports it back for
/// release once the stream terminates.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub preview_url: Option<String>,
}

/// A user message to send, with the model that should answer it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub model: String,
    pub content: String,
    pub attachments: Vec<OutgoingAttachment>,
}

/// A request to re-run or continue an existing AI message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegenerateRequest {
    pub message_id: i64,
    /// Append mode: continue the truncated answer instead of replacing it.
    pub continuation: bool,
}

/// An abstract gateway to the chat backend.
///
/// Implementations handle authentication headers, response envelopes, and
/// status mapping; callers see domain entities and typed errors.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Lists the user's sessions.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    /// Creates a session; the backend returns the full detail, including
    /// its welcome message.
    async fn create_session(&self, title: &str) -> Result<ChatSession>;

    /// Fetches the full transcript of a session.
    async fn fetch_session(&self, session_id: i64) -> Result<ChatSession>;

    /// Renames a session.
    async fn rename_session(&self, session_id: i64, title: &str) -> Result<SessionSummary>;

    /// Deletes a session.
    async fn delete_session(&self, session_id: i64) -> Result<()>;

    /// Deletes all of the user's sessions.
    async fn delete_all_sessions(&self) -> Result<()>;

    /// Exports a session transcript as rendered text.
    async fn export_session(&self, session_id: i64) -> Result<String>;

    /// Opens a generation stream for a new user message.
    async fn open_message_stream(
        &self,
        session_id: i64,
        outgoing: OutgoingMessage,
    ) -> Result<ByteStream>;

    /// Opens a generation stream that regenerates or continues an existing
    /// AI message.
    async fn open_regenerate_stream(
        &self,
        session_id: i64,
        model: &str,
        request: RegenerateRequest,
    ) -> Result<ByteStream>;
}
