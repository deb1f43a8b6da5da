//! Chat domain module.
//!
//! This module contains the chat-related domain models, the wire-event model
//! for streamed generations, and the gateway trait for backend access.
//!
//! # Module Structure
//!
//! - `model`: Session entities (`ChatSession`, `SessionSummary`)
//! - `message`: Message entities (`ChatMessage`, `Sender`, `MessageStatus`, ...)
//! - `event`: Parsed stream events (`StreamEvent`)
//! - `gateway`: Backend access trait (`ChatGateway`)

mod event;
mod gateway;
mod message;
mod model;

// Re-export public API
pub use event::StreamEvent;
pub use gateway::{
    ByteStream, ChatGateway, OutgoingAttachment, OutgoingMessage, RegenerateRequest,
};
pub use message::{
    ChatMessage, ContentKind, LocalIdGenerator, MessageFile, MessageStatus, Sender,
};
pub use model::{ChatSession, SessionSummary};
