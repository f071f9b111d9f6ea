//! Confirmed message records
//!
//! A [`ChatMessage`] is the canonical, server-confirmed shape of a message as
//! it appears in conversation history and in `new_message` frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, MessageId, UserId};

// ----------------------------------------------------------------------------
// Message Kind
// ----------------------------------------------------------------------------

/// Content category of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
    System,
}

impl Default for MessageKind {
    fn default() -> Self {
        Self::Text
    }
}

// ----------------------------------------------------------------------------
// Reaction
// ----------------------------------------------------------------------------

/// A single emoji reaction attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

// ----------------------------------------------------------------------------
// Chat Message
// ----------------------------------------------------------------------------

/// Server-confirmed message record
///
/// Immutable once received; reaction and edit updates arrive as separate
/// events and replace the record wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    #[serde(default)]
    pub message_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub read_by: Vec<UserId>,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
