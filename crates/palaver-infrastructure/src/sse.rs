//! SSE frame parser for generation streams.
//!
//! The backend frames stream output as `data: <json>` lines over a chunked
//! HTTP body. The transport delivers the body in arbitrarily-sized chunks
//! with no alignment to line boundaries, so the parser buffers bytes and
//! only decodes complete lines. One parser instance serves one stream; it
//! is not restartable.

use palaver_core::chat::StreamEvent;
use serde_json::Value;

/// Prefix of a protocol-conformant frame line.
const FRAME_PREFIX: &str = "data: ";

/// Heartbeat payload; discarded without emitting an event.
const KEEPALIVE: &str = ":keepalive";

/// Incremental decoder from body chunks to [`StreamEvent`]s.
///
/// Frames are emitted strictly in arrival order. Malformed frames are
/// logged and skipped; they never abort the stream. Valid JSON frames of an
/// unrecognized shape are surfaced as [`StreamEvent::Ignored`] so callers
/// can observe (and skip) them uniformly.
#[derive(Debug, Default)]
pub struct FrameParser {
    buffer: Vec<u8>,
}

impl FrameParser {
    /// Creates a parser with an empty decode buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one body chunk and returns every event completed by it.
    ///
    /// Chunk boundaries never change the decoded output: bytes sit in the
    /// buffer until a full line (up to `\n`) is available.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::parse_line(line.trim()) {
                events.push(event);
            }
        }
        events
    }

    /// Decodes one complete line into at most one event.
    fn parse_line(line: &str) -> Option<StreamEvent> {
        if line.is_empty() {
            return None;
        }

        if let Some(payload) = line.strip_prefix(FRAME_PREFIX) {
            if payload == KEEPALIVE {
                return None;
            }
            return match serde_json::from_str::<Value>(payload) {
                Ok(value) => Some(StreamEvent::from_json(&value)),
                Err(err) => {
                    tracing::warn!(%err, payload, "discarding malformed stream frame");
                    None
                }
            };
        }

        // Fallback: some backends emit a bare JSON error body mid-stream
        // instead of a framed error event.
        if line.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<Value>(line) {
                if let event @ StreamEvent::Error { .. } = StreamEvent::from_json(&value) {
                    return Some(event);
                }
                if let Some(detail) = value.get("detail").and_then(Value::as_str) {
                    return Some(StreamEvent::Error {
                        detail: detail.to_string(),
                    });
                }
            }
        }

        None
    }
}
