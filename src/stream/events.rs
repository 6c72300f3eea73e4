//! Stream event payloads.

use serde::{Deserialize, Serialize};

/// Event type carried in the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    /// Incremental answer text.
    Message,
    /// Incremental answer text from an agent app.
    AgentMessage,
    /// Synthesized audio chunk.
    TtsMessage,
    /// End of synthesized audio.
    TtsMessageEnd,
    /// Agent reasoning step.
    AgentThought,
    /// File attached to the answer.
    MessageFile,
    /// Answer complete; terminal.
    MessageEnd,
    /// Replacement of the answer so far (moderation).
    MessageReplace,
    /// Stream-level failure; terminal.
    Error,
    /// Keep-alive.
    Ping,
    /// Any event name not listed above.
    #[serde(other)]
    Unknown,
}

/// Token accounting attached to `message_end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Sum of both.
    #[serde(default)]
    pub total_tokens: u64,
}

/// `metadata` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Token usage, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One decoded `data:` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event type.
    pub event: StreamEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Answer text fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Base64 audio for `tts_message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
    /// HTTP-style status on `error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Error code on `error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Error message on `error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StreamEvent {
    /// An event of `kind` with no other fields set.
    pub fn new(kind: StreamEventKind) -> Self {
        Self {
            event: kind,
            task_id: None,
            message_id: None,
            conversation_id: None,
            answer: None,
            audio: None,
            created_at: None,
            metadata: None,
            status: None,
            code: None,
            message: None,
        }
    }

    /// The answer fragment when it is present and non-empty.
    pub fn answer_text(&self) -> Option<&str> {
        self.answer.as_deref().filter(|a| !a.is_empty())
    }

    /// Total tokens from `metadata.usage`, if reported.
    pub fn total_tokens(&self) -> Option<u64> {
        self.metadata
            .as_ref()
            .and_then(|m| m.usage)
            .map(|u| u.total_tokens)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use serde_json::json;

    #[test]
    fn message_event_fields() {
        let event: StreamEvent = serde_json::from_value(json!({
            "event": "message",
            "task_id": "t1",
            "message_id": "m1",
            "conversation_id": "c1",
            "answer": "こんにちは",
            "created_at": 1_705_395_332
        }))
        .unwrap();
        assert_eq!(event.event, StreamEventKind::Message);
        assert_eq!(event.answer_text(), Some("こんにちは"));
        assert_eq!(event.conversation_id.as_deref(), Some("c1"));
        assert_eq!(event.created_at, Some(1_705_395_332));
    }

    #[test]
    fn message_end_usage() {
        let event: StreamEvent = serde_json::from_value(json!({
            "event": "message_end",
            "metadata": {"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}}
        }))
        .unwrap();
        assert_eq!(event.event, StreamEventKind::MessageEnd);
        assert_eq!(event.total_tokens(), Some(15));
    }

    #[test]
    fn error_event_fields() {
        let event: StreamEvent = serde_json::from_value(json!({
            "event": "error",
            "status": 400,
            "code": "invalid_param",
            "message": "bad input"
        }))
        .unwrap();
        assert_eq!(event.event, StreamEventKind::Error);
        assert_eq!(event.status, Some(400));
        assert_eq!(event.message.as_deref(), Some("bad input"));
    }

    #[test]
    fn unknown_event_name_is_tolerated() {
        let event: StreamEvent =
            serde_json::from_value(json!({"event": "workflow_started"})).unwrap();
        assert_eq!(event.event, StreamEventKind::Unknown);
    }

    #[test]
    fn empty_answer_is_not_text() {
        let mut event = StreamEvent::new(StreamEventKind::Message);
        assert_eq!(event.answer_text(), None);
        event.answer = Some(String::new());
        assert_eq!(event.answer_text(), None);
    }

    #[test]
    fn all_known_names_round_trip() {
        for name in [
            "message",
            "agent_message",
            "tts_message",
            "tts_message_end",
            "agent_thought",
            "message_file",
            "message_end",
            "message_replace",
            "error",
            "ping",
        ] {
            let kind: StreamEventKind = serde_json::from_value(json!(name)).unwrap();
            assert_ne!(kind, StreamEventKind::Unknown, "{name}");
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
        }
    }
}
