//! Parsed stream events.
//!
//! The wire protocol distinguishes frames by the presence of an `event`
//! field (`done`, `error`) versus a `type` field (`content`, `reasoning`).
//! Frames are decoded into a closed tagged variant at parse time; anything
//! unrecognized becomes [`StreamEvent::Ignored`] rather than a decode
//! failure, so one odd frame can never abort a stream.

use serde_json::Value;

use super::message::ChatMessage;

/// One logical event from a generation stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A content delta to append to the target message.
    Content(String),
    /// A reasoning delta to append to the target message's trace.
    Reasoning(String),
    /// Terminal frame: the generation finished normally.
    Done {
        /// The authoritative message object, when the backend echoes one.
        message: Option<ChatMessage>,
        /// The full reasoning trace, when the backend echoes it.
        reasoning: Option<String>,
    },
    /// Terminal frame: the backend reported a generation failure.
    Error { detail: String },
    /// Any valid JSON object of an unrecognized shape.
    Ignored,
}

impl StreamEvent {
    /// Classifies a decoded frame payload.
    pub fn from_json(value: &Value) -> StreamEvent {
        let Some(object) = value.as_object() else {
            return StreamEvent::Ignored;
        };

        match object.get("event").and_then(Value::as_str) {
            Some("done") => {
                let message = object
                    .get("message")
                    .and_then(|m| serde_json::from_value(m.clone()).ok());
                let reasoning = object
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .map(str::to_owned);
                return StreamEvent::Done { message, reasoning };
            }
            Some("error") => {
                let detail = object
                    .get("detail")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown generation error")
                    .to_string();
                return StreamEvent::Error { detail };
            }
            _ => {}
        }

        let delta = object.get("content").and_then(Value::as_str);
        match (object.get("type").and_then(Value::as_str), delta) {
            (Some("content"), Some(delta)) => StreamEvent::Content(delta.to_string()),
            (Some("reasoning"), Some(delta)) => StreamEvent::Reasoning(delta.to_string()),
            _ => StreamEvent::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_content_and_reasoning() {
        assert_eq!(
            StreamEvent::from_json(&json!({"type": "content", "content": "Hi"})),
            StreamEvent::Content("Hi".to_string())
        );
        assert_eq!(
            StreamEvent::from_json(&json!({"type": "reasoning", "content": "hmm"})),
            StreamEvent::Reasoning("hmm".to_string())
        );
    }

    #[test]
    fn classifies_done_with_message() {
        let event = StreamEvent::from_json(&json!({
            "event": "done",
            "message": {"id": 99, "content": "Hi there", "sender": "ai"},
            "reasoning": "trace"
        }));
        let StreamEvent::Done { message, reasoning } = event else {
            panic!("expected done event");
        };
        let message = message.unwrap();
        assert_eq!(message.id, 99);
        assert_eq!(message.content, "Hi there");
        assert_eq!(reasoning.as_deref(), Some("trace"));
    }

    #[test]
    fn classifies_error() {
        assert_eq!(
            StreamEvent::from_json(&json!({"event": "error", "detail": "model overloaded"})),
            StreamEvent::Error {
                detail: "model overloaded".to_string()
            }
        );
        // Missing detail still classifies as an error
        assert!(matches!(
            StreamEvent::from_json(&json!({"event": "error"})),
            StreamEvent::Error { .. }
        ));
    }

    #[test]
    fn unknown_shapes_are_ignored() {
        assert_eq!(
            StreamEvent::from_json(&json!({"type": "usage", "tokens": 12})),
            StreamEvent::Ignored
        );
        assert_eq!(StreamEvent::from_json(&json!([1, 2, 3])), StreamEvent::Ignored);
        assert_eq!(
            StreamEvent::from_json(&json!({"type": "content"})),
            StreamEvent::Ignored
        );
    }
}
