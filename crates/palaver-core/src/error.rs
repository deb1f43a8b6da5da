//! Error types for the Palaver client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Palaver client.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum PalaverError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Transport-level failure (connection drop, DNS, non-2xx response)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Business-level failure reported inside a backend response envelope
    #[error("Backend error: {0}")]
    Backend(String),

    /// Authentication failure (HTTP 401); terminal for the client session
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A generation is already in flight for the session
    #[error("A generation is already running for session {session_id}")]
    AlreadyGenerating { session_id: i64 },

    /// Operation was cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "JSON", "multipart", etc.
        message: String,
    },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PalaverError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Creates an Unauthorized error
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this is an authentication failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Check if this is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a transport-level failure
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for PalaverError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            return Self::Unauthorized(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for PalaverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, PalaverError>`.
pub type Result<T> = std::result::Result<T, PalaverError>;
