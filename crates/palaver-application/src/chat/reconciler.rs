//! Reconciliation of parsed stream events into cached transcripts.
//!
//! Every mutation targets the transcript in the session cache for the
//! stream's session id — not necessarily the session currently displayed —
//! and runs under a single lock hold so lookup and update never straddle a
//! suspension point.

use std::sync::Arc;

use palaver_core::chat::{ChatMessage, MessageStatus, Sender, StreamEvent};

use super::cache::SessionCacheService;
use super::controller::GenerationMode;

/// Annotation appended when the backend reports a generation error.
const GENERATION_FAILED_PREFIX: &str = "**Generation failed:**";

/// Annotation used when a stream closes before producing anything.
const EMPTY_CLOSE_ANNOTATION: &str = "**Request failed:** connection closed without response";

/// What the stream driver should do after applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Keep reading frames.
    Pending,
    /// Terminal `done` was applied; stop reading.
    Completed,
    /// A backend-reported error was applied; stop reading.
    Faulted { detail: String },
}

/// Applies parsed stream events to the in-memory transcript.
pub struct ReconciliationEngine {
    cache: Arc<SessionCacheService>,
}

impl ReconciliationEngine {
    /// Creates an engine over the shared session cache.
    pub fn new(cache: Arc<SessionCacheService>) -> Self {
        Self { cache }
    }

    /// Applies one event against the target message of a stream.
    ///
    /// Events for a message that disappeared (e.g. the session was deleted
    /// mid-stream) are dropped silently; the driver keeps reading until a
    /// terminal frame or cancellation.
    pub async fn apply(
        &self,
        session_id: i64,
        target_message_id: i64,
        mode: GenerationMode,
        event: StreamEvent,
    ) -> ReconcileOutcome {
        match event {
            StreamEvent::Content(delta) => {
                self.cache
                    .with_session_mut(session_id, |session| {
                        if let Some(message) = session.find_message_mut(target_message_id) {
                            message.content.push_str(&delta);
                        }
                    })
                    .await;
                ReconcileOutcome::Pending
            }
            StreamEvent::Reasoning(delta) => {
                self.cache
                    .with_session_mut(session_id, |session| {
                        if let Some(message) = session.find_message_mut(target_message_id) {
                            message
                                .reasoning_content
                                .get_or_insert_with(String::new)
                                .push_str(&delta);
                        }
                    })
                    .await;
                ReconcileOutcome::Pending
            }
            StreamEvent::Done { message, reasoning } => {
                if mode.is_append() {
                    self.complete_in_place(session_id, target_message_id, message)
                        .await;
                } else {
                    self.replace_placeholder(session_id, target_message_id, message, reasoning)
                        .await;
                }
                ReconcileOutcome::Completed
            }
            StreamEvent::Error { detail } => {
                self.cache
                    .with_session_mut(session_id, |session| {
                        if let Some(message) = session.find_message_mut(target_message_id) {
                            append_annotation(
                                message,
                                &format!("{GENERATION_FAILED_PREFIX} {detail}"),
                            );
                            // A framed error is a settled answer with an
                            // annotation, not an errored message.
                            message.status = MessageStatus::Completed;
                        }
                    })
                    .await;
                ReconcileOutcome::Faulted { detail }
            }
            StreamEvent::Ignored => ReconcileOutcome::Pending,
        }
    }

    /// Append-mode `done`: content was already built incrementally, so only
    /// the status changes — plus the one-time promotion of a client-minted
    /// id to the server-assigned one when the backend supplies it.
    async fn complete_in_place(
        &self,
        session_id: i64,
        target_message_id: i64,
        done_message: Option<ChatMessage>,
    ) {
        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(message) = session.find_message_mut(target_message_id) {
                    message.status = MessageStatus::Completed;
                    if let Some(done) = done_message {
                        if message.is_local() && done.id >= 0 {
                            message.id = done.id;
                        }
                    }
                }
            })
            .await;
    }

    /// Replace-mode `done`: splice the placeholder out and insert the
    /// backend's authoritative message, carrying over the accumulated
    /// reasoning trace if the backend did not echo one back.
    async fn replace_placeholder(
        &self,
        session_id: i64,
        target_message_id: i64,
        done_message: Option<ChatMessage>,
        done_reasoning: Option<String>,
    ) {
        self.cache
            .with_session_mut(session_id, |session| {
                let Some(position) = session.position_of(target_message_id) else {
                    return;
                };

                let Some(mut authoritative) = done_message else {
                    // Defensive: a `done` without a message object cannot
                    // replace anything; settle the placeholder as-is.
                    session.messages[position].status = MessageStatus::Completed;
                    return;
                };

                let accumulated = session.messages[position].reasoning_content.take();
                authoritative.reasoning_content = done_reasoning
                    .filter(|r| !r.is_empty())
                    .or_else(|| authoritative.reasoning_content.take())
                    .or(accumulated);
                authoritative.status = MessageStatus::Completed;
                if authoritative.session == 0 {
                    authoritative.session = session_id;
                }
                session.messages[position] = authoritative;
            })
            .await;
    }

    /// Settles the target message after a stream ended with no `done`
    /// frame: a partial answer is preserved as completed; a stream that
    /// produced nothing becomes an error with a visible annotation.
    pub async fn close_without_done(&self, session_id: i64, target_message_id: i64) {
        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(message) = session.find_message_mut(target_message_id) {
                    if message.is_empty() {
                        message.content = EMPTY_CLOSE_ANNOTATION.to_string();
                        message.status = MessageStatus::Error;
                    } else {
                        message.status = MessageStatus::Completed;
                    }
                }
            })
            .await;
    }

    /// Marks the target of a cancelled stream as interrupted, keeping
    /// whatever partial content accumulated.
    pub async fn mark_interrupted(&self, session_id: i64, target_message_id: i64) {
        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(message) = session.find_message_mut(target_message_id) {
                    if message.status == MessageStatus::Generating {
                        message.status = MessageStatus::Interrupted;
                    }
                }
            })
            .await;
    }

    /// Annotates a failure into the target message and marks it errored.
    pub async fn annotate_failure(&self, session_id: i64, target_message_id: i64, detail: &str) {
        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(message) = session.find_message_mut(target_message_id) {
                    append_annotation(message, &format!("**Request failed:** {detail}"));
                    message.status = MessageStatus::Error;
                }
            })
            .await;
    }

    /// Post-stop reconciliation: after a manually-stopped session is
    /// refetched, the backend may still report the interrupted answer as
    /// completed (its write-back raced the stop). Downgrade a trailing,
    /// completed AI message to interrupted.
    pub async fn downgrade_after_stop(&self, session_id: i64) -> bool {
        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(last) = session.last_message_mut() {
                    if last.sender == Sender::Ai && last.status == MessageStatus::Completed {
                        last.status = MessageStatus::Interrupted;
                        return true;
                    }
                }
                false
            })
            .await
            .unwrap_or(false)
    }
}

/// Appends an annotation on its own paragraph, preserving partial content.
fn append_annotation(message: &mut ChatMessage, annotation: &str) {
    if !message.content.is_empty() {
        message.content.push_str("\n\n");
    }
    message.content.push_str(annotation);
}
