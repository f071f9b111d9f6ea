//! Wire frames for the conversation WebSocket
//!
//! Frames are JSON objects with a discriminating `type` field. Outbound
//! frames ([`ClientFrame`]) and inbound frames ([`ServerFrame`]) are modeled
//! as tagged enums; a frame whose tag is unknown fails to parse and is
//! dropped by the router rather than terminating the connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageKind};
use crate::types::{ConversationId, IdempotencyKey, MessageId, UserId};

// ----------------------------------------------------------------------------
// Outbound Frames
// ----------------------------------------------------------------------------

/// Frames sent from the client to the conversation endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    SendMessage(SendMessageFrame),
    Typing { is_typing: bool },
    ReadReceipt { message_id: MessageId },
}

/// Body of a `send_message` frame
///
/// The whole body, idempotency key included, is retransmitted byte-for-byte
/// on every retry of the same logical send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageFrame {
    pub message_id: MessageId,
    pub idempotency_key: IdempotencyKey,
    pub content: String,
    pub conversation_id: ConversationId,
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_metadata: Option<serde_json::Value>,
}

impl ClientFrame {
    /// Encode the frame as a JSON text payload
    pub fn encode(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ----------------------------------------------------------------------------
// Inbound Frames
// ----------------------------------------------------------------------------

/// Acknowledgment outcome reported by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    /// The live endpoint spells this `error`; accept both
    #[serde(alias = "error")]
    Failure,
}

/// Frames received from the conversation endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    MessageAck {
        message_id: MessageId,
        status: AckStatus,
        #[serde(default)]
        server_message_id: Option<MessageId>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        duplicated: bool,
        #[serde(default)]
        error: Option<String>,
    },
    NewMessage {
        #[serde(default)]
        conversation_id: Option<ConversationId>,
        message: ChatMessage,
    },
    Typing {
        user_id: UserId,
        is_typing: bool,
        #[serde(default)]
        conversation_id: Option<ConversationId>,
    },
    Read {
        message_id: MessageId,
        reader_id: UserId,
        #[serde(default)]
        read_at: Option<DateTime<Utc>>,
    },
    Presence {
        user_id: UserId,
        is_online: bool,
        #[serde(default)]
        conversation_id: Option<ConversationId>,
    },
}

impl ServerFrame {
    /// Decode a JSON text payload into a frame
    pub fn decode(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_encoding() {
        let frame = ClientFrame::SendMessage(SendMessageFrame {
            message_id: MessageId::generate(),
            idempotency_key: IdempotencyKey::generate(),
            content: "hello".into(),
            conversation_id: ConversationId::generate(),
            message_type: MessageKind::Text,
            reply_to: None,
            message_metadata: None,
        });

        let text = frame.encode().unwrap();
        assert!(text.contains(r#""type":"send_message""#));
        assert!(text.contains(r#""message_type":"text""#));
        // Optional fields are omitted, not sent as null
        assert!(!text.contains("reply_to"));
        assert!(!text.contains("message_metadata"));
    }

    #[test]
    fn test_ack_accepts_both_failure_spellings() {
        let id = MessageId::generate();
        for status in ["failure", "error"] {
            let text = format!(
                r#"{{"type":"message_ack","message_id":"{id}","status":"{status}","error":"content required"}}"#
            );
            match ServerFrame::decode(&text).unwrap() {
                ServerFrame::MessageAck { status, error, .. } => {
                    assert_eq!(status, AckStatus::Failure);
                    assert_eq!(error.as_deref(), Some("content required"));
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[test]
    fn test_success_ack_with_server_fields() {
        let id = MessageId::generate();
        let text = format!(
            r#"{{"type":"message_ack","message_id":"{id}","status":"success","server_message_id":"{id}","timestamp":"2024-05-01T12:00:00Z","duplicated":true}}"#
        );
        match ServerFrame::decode(&text).unwrap() {
            ServerFrame::MessageAck {
                message_id,
                status,
                server_message_id,
                duplicated,
                ..
            } => {
                assert_eq!(message_id, id);
                assert_eq!(status, AckStatus::Success);
                assert_eq!(server_message_id, Some(id));
                assert!(duplicated);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_frame_type_is_rejected() {
        let text = r#"{"type":"message_error","error":"message_id required","status":"error"}"#;
        assert!(ServerFrame::decode(text).is_err());
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        assert!(ServerFrame::decode("not json at all").is_err());
        assert!(ServerFrame::decode(r#"{"type":"typing"}"#).is_err());
    }
}
