//! Generation lifecycle controller.
//!
//! Owns the per-session cancellation tokens and the "is this session
//! generating" flag set. The registry is guarded by a std `Mutex` (never
//! held across an await) so that `cancel` flips the UI-visible generating
//! flag at the instant it returns, independent of when the network actually
//! stops delivering bytes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use palaver_core::error::{PalaverError, Result};

/// How long a "was manually stopped" mark stays valid before the next
/// forced refetch stops trusting it.
const STOP_MARK_TTL: Duration = Duration::from_secs(30);

/// The three generation modes sharing one stream protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// A new user turn; the placeholder is replaced at `done`.
    New,
    /// Re-run an existing AI answer; the message is replaced at `done`.
    Regenerate,
    /// Continue a truncated answer; deltas append and `done` only promotes
    /// status and id.
    Continue,
}

impl GenerationMode {
    /// Append mode keeps incrementally-built content at `done` instead of
    /// replacing it.
    pub fn is_append(self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// The live record for one session's in-flight stream.
#[derive(Debug, Clone)]
pub struct GenerationHandle {
    pub session_id: i64,
    pub token: CancellationToken,
    pub mode: GenerationMode,
    /// The message the stream is populating.
    pub target_message_id: i64,
}

/// Registry of in-flight generations, at most one per session id.
pub struct GenerationController {
    active: Mutex<HashMap<i64, GenerationHandle>>,
    /// Sessions stopped by the user, awaiting a post-stop refetch.
    stop_marks: Mutex<HashMap<i64, Instant>>,
}

impl GenerationController {
    /// Creates a controller with no active generations.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            stop_marks: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new generation for a session and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyGenerating` if a handle already exists for the
    /// session id.
    pub fn start(
        &self,
        session_id: i64,
        mode: GenerationMode,
        target_message_id: i64,
    ) -> Result<GenerationHandle> {
        let mut active = self.active.lock().expect("generation registry poisoned");
        if active.contains_key(&session_id) {
            return Err(PalaverError::AlreadyGenerating { session_id });
        }

        let handle = GenerationHandle {
            session_id,
            token: CancellationToken::new(),
            mode,
            target_message_id,
        };
        active.insert(session_id, handle.clone());
        Ok(handle)
    }

    /// Cancels the session's generation, if one is in flight.
    ///
    /// Signals the cancellation token, clears the generating flag, and
    /// records a "manually stopped" mark for the post-stop refetch. The
    /// flag is false by the time this returns; bytes the transport already
    /// buffered may still be delivered to the (winding-down) stream driver.
    pub fn cancel(&self, session_id: i64) -> bool {
        let removed = {
            let mut active = self.active.lock().expect("generation registry poisoned");
            active.remove(&session_id)
        };
        match removed {
            Some(handle) => {
                handle.token.cancel();
                self.stop_marks
                    .lock()
                    .expect("stop mark registry poisoned")
                    .insert(session_id, Instant::now());
                tracing::debug!(session_id, "generation cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight generation; returns how many were active.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<GenerationHandle> = {
            let mut active = self.active.lock().expect("generation registry poisoned");
            active.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &drained {
            handle.token.cancel();
        }
        drained.len()
    }

    /// Clears the generating flag if still set.
    ///
    /// Invoked from the stream's cleanup path regardless of success,
    /// failure, or cancellation; idempotent.
    pub fn finalize(&self, session_id: i64) {
        let mut active = self.active.lock().expect("generation registry poisoned");
        active.remove(&session_id);
    }

    /// Returns true if a generation is in flight for the session.
    pub fn is_generating(&self, session_id: i64) -> bool {
        let active = self.active.lock().expect("generation registry poisoned");
        active.contains_key(&session_id)
    }

    /// Returns the active handle for a session, if any.
    pub fn handle(&self, session_id: i64) -> Option<GenerationHandle> {
        let active = self.active.lock().expect("generation registry poisoned");
        active.get(&session_id).cloned()
    }

    /// Consumes the session's "manually stopped" mark, if still fresh.
    ///
    /// Returns true when the session was stopped within the mark's TTL; the
    /// mark is removed either way.
    pub fn take_stop_mark(&self, session_id: i64) -> bool {
        let mut marks = self.stop_marks.lock().expect("stop mark registry poisoned");
        match marks.remove(&session_id) {
            Some(at) => at.elapsed() <= STOP_MARK_TTL,
            None => false,
        }
    }
}

impl Default for GenerationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_registers_and_rejects_duplicates() {
        let controller = GenerationController::new();
        let handle = controller
            .start(42, GenerationMode::New, -2)
            .expect("first start succeeds");
        assert!(controller.is_generating(42));
        assert_eq!(handle.target_message_id, -2);

        let err = controller.start(42, GenerationMode::New, -4).unwrap_err();
        assert!(matches!(
            err,
            PalaverError::AlreadyGenerating { session_id: 42 }
        ));

        // A different session is unaffected
        assert!(controller.start(7, GenerationMode::Regenerate, 9).is_ok());
    }

    #[test]
    fn cancel_flips_flag_synchronously_and_signals_token() {
        let controller = GenerationController::new();
        let handle = controller.start(42, GenerationMode::New, -2).unwrap();

        assert!(controller.cancel(42));
        // Flag is already false when cancel returns
        assert!(!controller.is_generating(42));
        assert!(handle.token.is_cancelled());
    }

    #[test]
    fn cancel_without_active_generation_is_a_noop() {
        let controller = GenerationController::new();
        assert!(!controller.cancel(42));
        assert!(!controller.take_stop_mark(42));
    }

    #[test]
    fn finalize_is_idempotent() {
        let controller = GenerationController::new();
        controller.start(1, GenerationMode::Continue, 7).unwrap();
        controller.finalize(1);
        controller.finalize(1);
        assert!(!controller.is_generating(1));
        // Normal completion leaves no stop mark behind
        assert!(!controller.take_stop_mark(1));
    }

    #[test]
    fn stop_mark_is_consumed_once() {
        let controller = GenerationController::new();
        controller.start(5, GenerationMode::New, -1).unwrap();
        controller.cancel(5);
        assert!(controller.take_stop_mark(5));
        assert!(!controller.take_stop_mark(5));
    }

    #[test]
    fn cancel_all_signals_every_session() {
        let controller = GenerationController::new();
        let a = controller.start(1, GenerationMode::New, -1).unwrap();
        let b = controller.start(2, GenerationMode::New, -2).unwrap();

        assert_eq!(controller.cancel_all(), 2);
        assert!(a.token.is_cancelled());
        assert!(b.token.is_cancelled());
        assert!(!controller.is_generating(1));
        assert!(!controller.is_generating(2));
    }
}
