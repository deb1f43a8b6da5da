//! Core domain layer for Palaver.
//!
//! This crate holds the chat domain model (sessions, messages, stream
//! events), the shared error type, and the gateway trait that decouples the
//! application layer from the concrete HTTP backend.

pub mod chat;
pub mod error;

// Re-export common error type
pub use error::PalaverError;
