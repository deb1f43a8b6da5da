//! Failure classification for generation paths.
//!
//! Maps transport and protocol failures to their blast radius: a
//! user-initiated stop is not an error at all; an authentication failure is
//! terminal for the whole client session; anything else is contained to the
//! message being generated.

use palaver_core::error::PalaverError;

/// How a generation failure should be handled.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// The active cancellation token caused the failure; treat as a normal
    /// stop, not an error.
    Cancelled,
    /// Authentication failure: clear all caches, abort all generations,
    /// force logout.
    AuthExpired,
    /// Any other failure: annotate the target message in place; other
    /// sessions' generations are unaffected.
    Generation(String),
}

/// Classifies a failure observed while issuing or reading a stream.
///
/// `cancel_requested` reflects the session's cancellation token at the time
/// the failure surfaced: a transport error that races with an active cancel
/// is folded into the normal-stop path.
pub fn classify(error: &PalaverError, cancel_requested: bool) -> FailureKind {
    if cancel_requested || error.is_cancelled() {
        return FailureKind::Cancelled;
    }
    if error.is_unauthorized() {
        return FailureKind::AuthExpired;
    }
    FailureKind::Generation(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_wins_over_transport_errors() {
        let error = PalaverError::transport("connection reset");
        assert_eq!(classify(&error, true), FailureKind::Cancelled);
        assert_eq!(classify(&PalaverError::Cancelled, false), FailureKind::Cancelled);
    }

    #[test]
    fn unauthorized_is_terminal_for_the_client_session() {
        let error = PalaverError::unauthorized("HTTP 401");
        assert_eq!(classify(&error, false), FailureKind::AuthExpired);
    }

    #[test]
    fn other_failures_stay_contained() {
        let error = PalaverError::transport("connection reset");
        let FailureKind::Generation(detail) = classify(&error, false) else {
            panic!("expected contained failure");
        };
        assert!(detail.contains("connection reset"));
    }
}
