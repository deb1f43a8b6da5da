//! Chat service facade.
//!
//! Wires the gateway, cache, generation controller, and reconciliation
//! engine into the operations a UI shell calls: session CRUD, the three
//! generation entry points, and stop. Generation calls drive the stream to
//! completion before returning; the shell runs them on its own tasks and
//! issues `stop_generation` from another task when the user interrupts.

use std::sync::Arc;

use futures::StreamExt;
use tokio::time::Duration;

use palaver_core::chat::{
    ByteStream, ChatGateway, ChatMessage, ChatSession, ContentKind, LocalIdGenerator, MessageFile,
    MessageStatus, OutgoingMessage, RegenerateRequest, Sender, SessionSummary,
};
use palaver_core::error::{PalaverError, Result};
use palaver_infrastructure::FrameParser;

use super::cache::SessionCacheService;
use super::classify::{classify, FailureKind};
use super::controller::{GenerationController, GenerationHandle, GenerationMode};
use super::events::{self, ChatEvent, EventReceiver, EventSender};
use super::reconciler::{ReconcileOutcome, ReconciliationEngine};

/// Grace period between a manual stop and the forced refetch, giving the
/// backend time to persist whatever partial answer it had.
const POST_STOP_REFETCH_DELAY: Duration = Duration::from_millis(500);

/// How a stream's read loop ended.
enum StreamEnd {
    /// Terminal `done` frame applied.
    Done,
    /// Backend-reported error frame applied.
    Faulted(String),
    /// The session's cancellation token fired.
    Cancelled,
    /// The body closed without a terminal frame.
    ClosedEarly,
    /// The transport failed mid-body.
    TransportFailed(PalaverError),
}

/// The application-facing chat service.
pub struct ChatService {
    gateway: Arc<dyn ChatGateway>,
    cache: Arc<SessionCacheService>,
    controller: Arc<GenerationController>,
    reconciler: ReconciliationEngine,
    local_ids: LocalIdGenerator,
    events: EventSender,
}

impl ChatService {
    /// Creates the service and the event channel the UI shell listens on.
    pub fn new(gateway: Arc<dyn ChatGateway>) -> (Arc<Self>, EventReceiver) {
        let cache = Arc::new(SessionCacheService::new());
        let (sender, receiver) = events::channel();
        let service = Arc::new(Self {
            gateway,
            reconciler: ReconciliationEngine::new(cache.clone()),
            cache,
            controller: Arc::new(GenerationController::new()),
            local_ids: LocalIdGenerator::new(),
            events: sender,
        });
        (service, receiver)
    }

    /// Returns true if a generation is in flight for the session.
    pub fn is_generating(&self, session_id: i64) -> bool {
        self.controller.is_generating(session_id)
    }

    /// Lists the user's sessions.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.guard(self.gateway.list_sessions().await).await
    }

    /// Creates a session and caches its initial transcript.
    pub async fn create_session(&self, title: &str) -> Result<ChatSession> {
        let session = self.guard(self.gateway.create_session(title).await).await?;
        self.cache.insert(session.clone()).await;
        Ok(session)
    }

    /// Returns a session's transcript, serving the cache when it is
    /// authoritative.
    ///
    /// A generating session is always served from cache: the stream is
    /// mutating the cached transcript and a backend fetch would clobber it.
    /// Otherwise a cached copy is returned unless `force` demands a
    /// refetch. A refetch that lands after a manual stop reconciles the
    /// backend's write-back race by downgrading a trailing completed AI
    /// answer to interrupted.
    pub async fn fetch_session_detail(&self, session_id: i64, force: bool) -> Result<ChatSession> {
        if self.controller.is_generating(session_id) {
            if let Some(cached) = self.cache.get(session_id).await {
                return Ok(cached);
            }
        }
        if !force {
            if let Some(cached) = self.cache.get(session_id).await {
                return Ok(cached);
            }
        }

        let session = self.guard(self.gateway.fetch_session(session_id).await).await?;
        self.cache.insert(session).await;

        if self.controller.take_stop_mark(session_id)
            && self.reconciler.downgrade_after_stop(session_id).await
        {
            tracing::debug!(session_id, "downgraded trailing answer after manual stop");
        }

        self.cache
            .get(session_id)
            .await
            .ok_or_else(|| PalaverError::not_found("session", session_id))
    }

    /// Renames a session, keeping the cached title coherent.
    pub async fn rename_session(&self, session_id: i64, title: &str) -> Result<SessionSummary> {
        let summary = self
            .guard(self.gateway.rename_session(session_id, title).await)
            .await?;
        self.cache
            .with_session_mut(session_id, |session| {
                session.title = summary.title.clone();
            })
            .await;
        Ok(summary)
    }

    /// Deletes a session, aborting any generation it has in flight.
    pub async fn delete_session(&self, session_id: i64) -> Result<()> {
        self.guard(self.gateway.delete_session(session_id).await)
            .await?;
        self.controller.cancel(session_id);
        self.cache.remove(session_id).await;
        Ok(())
    }

    /// Deletes every session, aborting all in-flight generations.
    pub async fn delete_all_sessions(&self) -> Result<()> {
        self.guard(self.gateway.delete_all_sessions().await).await?;
        self.controller.cancel_all();
        self.cache.clear().await;
        Ok(())
    }

    /// Exports a session transcript as rendered text.
    pub async fn export_session(&self, session_id: i64) -> Result<String> {
        self.guard(self.gateway.export_session(session_id).await)
            .await
    }

    /// Sends a user message and streams the answer into the transcript.
    ///
    /// The user message and an AI placeholder are inserted optimistically
    /// with client-minted ids before the request goes out; the placeholder
    /// is replaced by the backend's authoritative message at `done`.
    /// Returns once the stream settles; mid-stream failures are reconciled
    /// into the transcript and reported over the event channel rather than
    /// as an `Err`.
    pub async fn send_message(&self, session_id: i64, outgoing: OutgoingMessage) -> Result<()> {
        let user_id = self.local_ids.next_id();
        let placeholder_id = self.local_ids.next_id();
        let handle = self
            .controller
            .start(session_id, GenerationMode::New, placeholder_id)?;

        let content_kind = if outgoing.attachments.is_empty() {
            ContentKind::Text
        } else {
            ContentKind::File
        };
        let files: Vec<MessageFile> = outgoing
            .attachments
            .iter()
            .enumerate()
            .map(|(index, attachment)| MessageFile {
                id: -1 - index as i64,
                file_url: attachment.preview_url.clone().unwrap_or_default(),
                file_name: attachment.file_name.clone(),
                file_type: attachment.mime_type.clone(),
            })
            .collect();
        let preview_urls: Vec<String> = outgoing
            .attachments
            .iter()
            .filter_map(|attachment| attachment.preview_url.clone())
            .collect();
        let user_message = ChatMessage::user(
            user_id,
            session_id,
            outgoing.content.clone(),
            content_kind,
            files,
        );

        let inserted = self
            .cache
            .with_session_mut(session_id, |session| {
                session.messages.push(user_message);
                session
                    .messages
                    .push(ChatMessage::placeholder(placeholder_id, session_id));
            })
            .await;
        if inserted.is_none() {
            self.controller.finalize(session_id);
            return Err(PalaverError::not_found("session", session_id));
        }

        // Previews are released however the send terminates, success or
        // failure, so the shell can revoke the local resources.
        let result = match self
            .guard(self.gateway.open_message_stream(session_id, outgoing).await)
            .await
        {
            Ok(stream) => {
                self.drive_stream(&handle, stream).await;
                Ok(())
            }
            Err(err) => self.fail_before_stream(&handle, err).await,
        };
        if !preview_urls.is_empty() {
            events::emit(&self.events, ChatEvent::PreviewsReleased { urls: preview_urls });
        }
        result
    }

    /// Re-runs an existing AI answer; the message is cleared and replaced
    /// by the fresh answer at `done`.
    pub async fn regenerate(&self, session_id: i64, model: &str, message_id: i64) -> Result<()> {
        self.ensure_ai_target(session_id, message_id).await?;
        let handle = self
            .controller
            .start(session_id, GenerationMode::Regenerate, message_id)?;

        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(message) = session.find_message_mut(message_id) {
                    message.content.clear();
                    message.reasoning_content = None;
                    message.status = MessageStatus::Generating;
                }
            })
            .await;

        let request = RegenerateRequest {
            message_id,
            continuation: false,
        };
        let stream = match self
            .guard(
                self.gateway
                    .open_regenerate_stream(session_id, model, request)
                    .await,
            )
            .await
        {
            Ok(stream) => stream,
            Err(err) => return self.fail_before_stream(&handle, err).await,
        };

        self.drive_stream(&handle, stream).await;
        Ok(())
    }

    /// Continues a truncated AI answer; deltas append to the existing
    /// content and `done` only settles status and id.
    pub async fn continue_generation(
        &self,
        session_id: i64,
        model: &str,
        message_id: i64,
    ) -> Result<()> {
        self.ensure_ai_target(session_id, message_id).await?;
        let handle = self
            .controller
            .start(session_id, GenerationMode::Continue, message_id)?;

        self.cache
            .with_session_mut(session_id, |session| {
                if let Some(message) = session.find_message_mut(message_id) {
                    message.status = MessageStatus::Generating;
                }
            })
            .await;

        let request = RegenerateRequest {
            message_id,
            continuation: true,
        };
        let stream = match self
            .guard(
                self.gateway
                    .open_regenerate_stream(session_id, model, request)
                    .await,
            )
            .await
        {
            Ok(stream) => stream,
            Err(err) => return self.fail_before_stream(&handle, err).await,
        };

        self.drive_stream(&handle, stream).await;
        Ok(())
    }

    /// Stops the session's in-flight generation.
    ///
    /// The generating flag is already clear when the cancellation is
    /// issued; after a short grace period the transcript is refetched so
    /// the view reflects whatever the backend persisted, with the
    /// write-back race downgraded via the stop mark.
    pub async fn stop_generation(&self, session_id: i64) -> Result<()> {
        if !self.controller.cancel(session_id) {
            return Ok(());
        }

        tokio::time::sleep(POST_STOP_REFETCH_DELAY).await;
        if let Err(err) = self.fetch_session_detail(session_id, true).await {
            tracing::warn!(session_id, error = %err, "post-stop refetch failed");
        }
        Ok(())
    }

    /// Validates that a regenerate/continue target exists and is an AI
    /// message.
    async fn ensure_ai_target(&self, session_id: i64, message_id: i64) -> Result<()> {
        let session = self
            .cache
            .get(session_id)
            .await
            .ok_or_else(|| PalaverError::not_found("session", session_id))?;
        let target = session
            .find_message(message_id)
            .ok_or_else(|| PalaverError::not_found("message", message_id))?;
        if target.sender != Sender::Ai {
            return Err(PalaverError::internal(
                "only AI messages can be regenerated or continued",
            ));
        }
        Ok(())
    }

    /// Settles a generation whose request failed before any byte arrived.
    async fn fail_before_stream(&self, handle: &GenerationHandle, err: PalaverError) -> Result<()> {
        match classify(&err, handle.token.is_cancelled()) {
            FailureKind::Cancelled => {
                self.reconciler
                    .mark_interrupted(handle.session_id, handle.target_message_id)
                    .await;
            }
            // guard() already tore the caches down
            FailureKind::AuthExpired => {}
            FailureKind::Generation(detail) => {
                self.reconciler
                    .annotate_failure(handle.session_id, handle.target_message_id, &detail)
                    .await;
            }
        }
        self.controller.finalize(handle.session_id);
        events::emit(
            &self.events,
            ChatEvent::GenerationFinished {
                session_id: handle.session_id,
            },
        );
        Err(err)
    }

    /// Reads a stream to its terminal state, reconciling every event into
    /// the cached transcript.
    ///
    /// Cancellation is checked before each chunk (`biased`) so a stop cuts
    /// the loop even while the transport still has buffered bytes.
    async fn drive_stream(&self, handle: &GenerationHandle, mut stream: ByteStream) {
        let session_id = handle.session_id;
        let target = handle.target_message_id;
        let mut parser = FrameParser::new();

        let end = 'read: loop {
            let chunk = tokio::select! {
                biased;
                _ = handle.token.cancelled() => break 'read StreamEnd::Cancelled,
                chunk = stream.next() => chunk,
            };
            match chunk {
                None => break 'read StreamEnd::ClosedEarly,
                Some(Err(err)) => break 'read StreamEnd::TransportFailed(err),
                Some(Ok(bytes)) => {
                    for event in parser.push(&bytes) {
                        match self
                            .reconciler
                            .apply(session_id, target, handle.mode, event)
                            .await
                        {
                            ReconcileOutcome::Pending => {}
                            ReconcileOutcome::Completed => break 'read StreamEnd::Done,
                            ReconcileOutcome::Faulted { detail } => {
                                break 'read StreamEnd::Faulted(detail)
                            }
                        }
                    }
                }
            }
        };

        match end {
            StreamEnd::Done => {}
            StreamEnd::Faulted(detail) => {
                events::emit(
                    &self.events,
                    ChatEvent::GenerationFailed { session_id, detail },
                );
            }
            StreamEnd::Cancelled => {
                self.reconciler.mark_interrupted(session_id, target).await;
            }
            StreamEnd::ClosedEarly => {
                self.reconciler.close_without_done(session_id, target).await;
            }
            StreamEnd::TransportFailed(err) => {
                match classify(&err, handle.token.is_cancelled()) {
                    FailureKind::Cancelled => {
                        self.reconciler.mark_interrupted(session_id, target).await;
                    }
                    FailureKind::AuthExpired => {
                        self.auth_teardown().await;
                    }
                    FailureKind::Generation(detail) => {
                        self.reconciler
                            .annotate_failure(session_id, target, &detail)
                            .await;
                        events::emit(
                            &self.events,
                            ChatEvent::GenerationFailed { session_id, detail },
                        );
                    }
                }
            }
        }

        self.controller.finalize(session_id);
        events::emit(&self.events, ChatEvent::GenerationFinished { session_id });
    }

    /// Propagates a gateway result, tearing down on authentication failure.
    async fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_unauthorized() {
                self.auth_teardown().await;
            }
        }
        result
    }

    /// Authentication expired: abort every generation, drop every cached
    /// transcript, and tell the shell to log out.
    async fn auth_teardown(&self) {
        let aborted = self.controller.cancel_all();
        self.cache.clear().await;
        tracing::warn!(aborted, "authentication expired, caches cleared");
        events::emit(&self.events, ChatEvent::AuthExpired);
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;
