//! Collaborator interfaces
//!
//! The conversation endpoint exposes a small REST surface next to its
//! WebSocket; this module defines the traits the session consumes without
//! reimplementing that backend. Credentials likewise come from whatever auth
//! collaborator the application uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatwire_core::history::{Cursor, Page};
use chatwire_core::types::{ConversationId, UserId};
use chatwire_core::Result;

// ----------------------------------------------------------------------------
// Credential Provider
// ----------------------------------------------------------------------------

/// Supplies the bearer token attached to every connection
///
/// Returning `None` makes the next connect attempt fail with
/// `CredentialMissing`; the connection manager owns that failure state, so
/// no other component needs an "auth is broken" flag.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, for tools and tests
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new<T: Into<String>>(token: T) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl CredentialProvider for StaticCredential {
    fn bearer_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

// ----------------------------------------------------------------------------
// Backend Records
// ----------------------------------------------------------------------------

/// Category of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
    Channel,
}

/// Conversation record as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub conversation_type: ConversationKind,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: Vec<UserId>,
}

/// User record as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ----------------------------------------------------------------------------
// Chat Backend
// ----------------------------------------------------------------------------

/// HTTP surface of the conversation endpoint
///
/// Only `message_page` is driven by the session itself (history
/// pagination); the remaining operations are exposed for application code
/// that shares the same backend client.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Fetch messages strictly older than `before` (newest page first)
    async fn message_page(
        &self,
        conversation: ConversationId,
        before: Option<Cursor>,
        limit: usize,
    ) -> Result<Page>;

    /// All conversations the authenticated user participates in
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Create a conversation with the given participants
    async fn create_conversation(
        &self,
        kind: ConversationKind,
        participants: Vec<UserId>,
    ) -> Result<ConversationSummary>;

    /// Look up a user by email address
    async fn user_by_email(&self, email: &str) -> Result<Option<UserProfile>>;
}
