//! HTTP gateway to the chat backend.
//!
//! Implements [`ChatGateway`] over reqwest. Plain endpoints exchange JSON
//! wrapped in the backend's `{code, message, data}` envelope; the two
//! generation endpoints hand back the raw response body as a byte stream.
//! Bearer authorization and the optional upstream-model API key header are
//! attached to every request when configured.

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use palaver_core::chat::{
    ByteStream, ChatGateway, ChatSession, OutgoingMessage, RegenerateRequest, SessionSummary,
};
use palaver_core::error::{PalaverError, Result};

/// Header carrying a caller-supplied API key for the upstream model.
const UPSTREAM_KEY_HEADER: &str = "X-Model-Api-Key";

/// Business codes the backend uses for success.
const OK_CODES: [u16; 3] = [200, 201, 204];

/// Gateway implementation that talks to the chat backend over HTTP.
pub struct HttpChatGateway {
    client: Client,
    base_url: String,
    auth_token: RwLock<Option<String>>,
    upstream_api_key: RwLock<Option<String>>,
}

impl HttpChatGateway {
    /// Creates a gateway rooted at the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: RwLock::new(None),
            upstream_api_key: RwLock::new(None),
        }
    }

    /// Sets or clears the bearer token attached to requests.
    pub async fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write().await = token;
    }

    /// Sets or clears the upstream-model API key header.
    pub async fn set_upstream_api_key(&self, key: Option<String>) {
        *self.upstream_api_key.write().await = key;
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(token) = self.auth_token.read().await.as_deref() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(key) = self.upstream_api_key.read().await.as_deref() {
            request = request.header(UPSTREAM_KEY_HEADER, key);
        }
        request
    }

    /// Maps non-success statuses to typed errors, reading the body for
    /// whatever error text the backend produced.
    async fn ensure_ok(response: Response) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(PalaverError::unauthorized(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(PalaverError::transport(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    /// Unwraps the backend's `{code, message, data}` envelope.
    async fn unwrap_envelope<T>(response: Response) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = Self::ensure_ok(response).await?;
        let envelope: Envelope<T> = response.json().await?;
        if !OK_CODES.contains(&envelope.code) {
            return Err(PalaverError::backend(
                envelope
                    .message
                    .unwrap_or_else(|| format!("backend code {}", envelope.code)),
            ));
        }
        Ok(envelope.data)
    }

    /// Like `unwrap_envelope`, but the payload is mandatory.
    async fn expect_data<T>(response: Response, entity: &'static str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        Self::unwrap_envelope(response)
            .await?
            .ok_or_else(|| PalaverError::internal(format!("backend returned no {entity} payload")))
    }

    async fn open_stream(&self, request: RequestBuilder) -> Result<ByteStream> {
        let response = request.send().await?;
        let response = Self::ensure_ok(response).await?;
        Ok(Box::pin(response.bytes_stream().map_err(PalaverError::from)))
    }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let request = self.authorize(self.client.get(self.url("sessions/"))).await;
        let sessions = Self::expect_data(request.send().await?, "session list").await?;
        Ok(sessions)
    }

    async fn create_session(&self, title: &str) -> Result<ChatSession> {
        let request = self
            .authorize(self.client.post(self.url("sessions/")))
            .await
            .json(&TitlePayload { title });
        Self::expect_data(request.send().await?, "session").await
    }

    async fn fetch_session(&self, session_id: i64) -> Result<ChatSession> {
        let request = self
            .authorize(self.client.get(self.url(&format!("sessions/{session_id}/"))))
            .await;
        Self::expect_data(request.send().await?, "session").await
    }

    async fn rename_session(&self, session_id: i64, title: &str) -> Result<SessionSummary> {
        let request = self
            .authorize(self.client.patch(self.url(&format!("sessions/{session_id}/"))))
            .await
            .json(&TitlePayload { title });
        Self::expect_data(request.send().await?, "session").await
    }

    async fn delete_session(&self, session_id: i64) -> Result<()> {
        let request = self
            .authorize(
                self.client
                    .delete(self.url(&format!("sessions/{session_id}/"))),
            )
            .await;
        Self::unwrap_envelope::<serde_json::Value>(request.send().await?).await?;
        Ok(())
    }

    async fn delete_all_sessions(&self) -> Result<()> {
        let request = self
            .authorize(self.client.post(self.url("sessions/bulk-delete/")))
            .await;
        Self::unwrap_envelope::<serde_json::Value>(request.send().await?).await?;
        Ok(())
    }

    async fn export_session(&self, session_id: i64) -> Result<String> {
        let request = self
            .authorize(
                self.client
                    .get(self.url(&format!("sessions/{session_id}/export/"))),
            )
            .await;
        let response = Self::ensure_ok(request.send().await?).await?;
        Ok(response.text().await?)
    }

    async fn open_message_stream(
        &self,
        session_id: i64,
        outgoing: OutgoingMessage,
    ) -> Result<ByteStream> {
        let mut form = reqwest::multipart::Form::new()
            .text("model", outgoing.model)
            .text("content", outgoing.content);
        for attachment in outgoing.attachments {
            let part = reqwest::multipart::Part::bytes(attachment.bytes)
                .file_name(attachment.file_name)
                .mime_str(&attachment.mime_type)
                .map_err(|err| PalaverError::Serialization {
                    format: "multipart".to_string(),
                    message: err.to_string(),
                })?;
            form = form.part("files", part);
        }

        let request = self
            .authorize(
                self.client
                    .post(self.url(&format!("sessions/{session_id}/messages-stream/"))),
            )
            .await
            .multipart(form);
        self.open_stream(request).await
    }

    async fn open_regenerate_stream(
        &self,
        session_id: i64,
        model: &str,
        request: RegenerateRequest,
    ) -> Result<ByteStream> {
        let payload = RegeneratePayload {
            message_id: request.message_id,
            model,
            mode: request.continuation.then_some("continue"),
        };
        let request = self
            .authorize(
                self.client
                    .post(self.url(&format!("sessions/{session_id}/regenerate/"))),
            )
            .await
            .json(&payload);
        self.open_stream(request).await
    }
}

/// The backend's standard response envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    code: u16,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Serialize)]
struct TitlePayload<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct RegeneratePayload<'a> {
    message_id: i64,
    model: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    mode: Option<&'static str>,
}
