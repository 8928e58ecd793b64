//! Wire protocol frames: client commands and server events.
//!
//! Frames are tagged JSON objects over a closed set of `type` values.
//! Client frames outside the set deserialize to [`ClientFrame::Unknown`]
//! and are ignored without closing the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::MessageId;
use crate::domain::registry::MessagePosted;
use crate::error::ChatError;

/// Client → server frames.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Send a text message to the connection's room.
    Send {
        /// Message text.
        content: String,
    },
    /// Any `type` value outside the closed set.
    #[serde(other)]
    Unknown,
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection acknowledgement, sent once after a successful connect.
    Ack {
        /// Human-readable greeting.
        text: String,
    },
    /// A message broadcast to the room.
    Message {
        /// Canonical message payload.
        message: MessageView,
    },
    /// An error reported to the originating connection only.
    Error {
        /// Numeric error code (see [`ChatError::error_code`]).
        code: u32,
        /// Human-readable error message.
        message: String,
    },
}

impl ServerFrame {
    /// Builds the connection acknowledgement frame.
    #[must_use]
    pub fn ack(text: impl Into<String>) -> Self {
        Self::Ack { text: text.into() }
    }

    /// Builds the broadcast frame for a posted message.
    #[must_use]
    pub fn message(posted: &MessagePosted) -> Self {
        Self::Message {
            message: MessageView::from(posted),
        }
    }

    /// Builds the error frame for a rejected request.
    #[must_use]
    pub fn error(error: &ChatError) -> Self {
        Self::Error {
            code: error.error_code(),
            message: error.to_string(),
        }
    }

    /// Serializes the frame to its JSON wire form.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Canonical wire representation of one message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    /// Time-ordered message id.
    pub id: MessageId,
    /// Message text; tombstone text for deleted messages, empty for
    /// attachment-only ones.
    pub content: String,
    /// Sender's display name.
    pub sender: String,
    /// Arrival timestamp.
    pub timestamp: DateTime<Utc>,
}

impl From<&MessagePosted> for MessageView {
    fn from(posted: &MessagePosted) -> Self {
        Self {
            id: posted.message.id,
            content: posted.message.content.clone().unwrap_or_default(),
            sender: posted.sender_name.clone(),
            timestamp: posted.message.created_at,
        }
    }
}

/// Parses a client frame, returning `None` for malformed JSON. Unknown
/// frame types parse successfully as [`ClientFrame::Unknown`].
#[must_use]
pub fn parse_client_frame(text: &str) -> Option<ClientFrame> {
    serde_json::from_str(text).ok()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::message::{Message, MessageKind};
    use crate::domain::{RoomId, UserId};

    #[test]
    fn send_frame_parses() {
        let frame = parse_client_frame(r#"{"type":"send","content":"hi"}"#);
        assert_eq!(
            frame,
            Some(ClientFrame::Send {
                content: "hi".to_string()
            })
        );
    }

    #[test]
    fn unknown_type_parses_to_unknown() {
        let frame = parse_client_frame(r#"{"type":"typing","room":"x"}"#);
        assert_eq!(frame, Some(ClientFrame::Unknown));
    }

    #[test]
    fn malformed_json_is_none() {
        assert!(parse_client_frame("not json").is_none());
        assert!(parse_client_frame(r#"{"content":"no type"}"#).is_none());
    }

    #[test]
    fn message_frame_has_expected_shape() {
        let posted = MessagePosted {
            message: Message {
                id: MessageId::new(),
                room_id: RoomId::new(),
                sender: UserId::new(),
                kind: MessageKind::Text,
                content: Some("hi".to_string()),
                attachment: None,
                created_at: Utc::now(),
                edited_at: None,
                is_deleted: false,
                reply_to: None,
            },
            sender_name: "alice".to_string(),
        };

        let json = ServerFrame::message(&posted).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).ok().unwrap_or_default();
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("message"));
        let message = value.get("message");
        let Some(message) = message else {
            panic!("missing message payload");
        };
        assert_eq!(message.get("content").and_then(|v| v.as_str()), Some("hi"));
        assert_eq!(message.get("sender").and_then(|v| v.as_str()), Some("alice"));
        assert!(message.get("id").is_some());
        assert!(message.get("timestamp").is_some());
    }

    #[test]
    fn ack_and_error_frames_are_tagged() {
        let ack = ServerFrame::ack("alice connected to chat room!").to_json();
        let value: serde_json::Value = serde_json::from_str(&ack).ok().unwrap_or_default();
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("ack"));

        let err = ServerFrame::error(&ChatError::EmptyMessage).to_json();
        let value: serde_json::Value = serde_json::from_str(&err).ok().unwrap_or_default();
        assert_eq!(value.get("type").and_then(|v| v.as_str()), Some("error"));
        assert_eq!(value.get("code").and_then(serde_json::Value::as_u64), Some(1001));
    }
}
