//! Outcomes surfaced to the UI shell.
//!
//! The library does not render anything; it reports what the UI must react
//! to over an unbounded channel, in the same channel-to-frontend style the
//! rest of the stack uses for progress events.

use tokio::sync::mpsc;

/// An outcome the UI shell should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A generation finished (any terminal state) and the session's
    /// transcript is settled.
    GenerationFinished { session_id: i64 },
    /// A generation failed; the target message carries an inline
    /// annotation, and the UI should show a transient notification.
    GenerationFailed { session_id: i64, detail: String },
    /// Authentication expired: caches are cleared and all generations
    /// aborted; the UI should log out and redirect to the entry screen.
    AuthExpired,
    /// Local attachment preview resources can be released.
    PreviewsReleased { urls: Vec<String> },
}

pub type EventSender = mpsc::UnboundedSender<ChatEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ChatEvent>;

/// Creates the event channel pair.
pub(crate) fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Sends an event, ignoring a dropped receiver (a headless caller may not
/// keep the receiving side).
pub(crate) fn emit(sender: &EventSender, event: ChatEvent) {
    let _ = sender.send(event);
}
