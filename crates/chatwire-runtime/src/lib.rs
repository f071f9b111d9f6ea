//! Chatwire runtime
//!
//! Tokio orchestration for the Chatwire messaging client: the WebSocket
//! connection lifecycle manager, the inbound frame router, and the
//! per-conversation session task that drives the state machines in
//! `chatwire-core` from a single event-processing sequence.
//!
//! The usual entry point is [`Conversation::open`], which wires a
//! [`connection::ConnectionManager`] to a [`session::ConversationSession`]
//! and returns the client handle:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatwire_core::types::{ConversationId, UserId};
//! use chatwire_core::ChatwireConfig;
//! use chatwire_runtime::{Conversation, StaticCredential};
//! # use chatwire_runtime::api::{ChatBackend, ConversationKind, ConversationSummary, UserProfile};
//! # use chatwire_core::history::{Cursor, Page};
//! # struct NoBackend;
//! # #[async_trait::async_trait]
//! # impl ChatBackend for NoBackend {
//! #     async fn message_page(
//! #         &self,
//! #         _conversation: ConversationId,
//! #         _before: Option<Cursor>,
//! #         _limit: usize,
//! #     ) -> chatwire_core::Result<Page> {
//! #         Ok(Page { messages: vec![], has_more: false, next_cursor: None })
//! #     }
//! #     async fn list_conversations(&self) -> chatwire_core::Result<Vec<ConversationSummary>> {
//! #         Ok(vec![])
//! #     }
//! #     async fn create_conversation(
//! #         &self,
//! #         _kind: ConversationKind,
//! #         _participants: Vec<chatwire_core::types::UserId>,
//! #     ) -> chatwire_core::Result<ConversationSummary> {
//! #         unimplemented!()
//! #     }
//! #     async fn user_by_email(
//! #         &self,
//! #         _email: &str,
//! #     ) -> chatwire_core::Result<Option<UserProfile>> {
//! #         Ok(None)
//! #     }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> chatwire_core::Result<()> {
//! let conversation = Conversation::open(
//!     "ws://localhost:8000",
//!     ConversationId::generate(),
//!     UserId::generate(),
//!     Arc::new(StaticCredential::new("jwt")),
//!     Arc::new(NoBackend),
//!     ChatwireConfig::default(),
//! )?;
//!
//! let message_id = conversation.client.send("hello").await?;
//! println!("delivered as {message_id}");
//! conversation.close().await;
//! # Ok(())
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod api;
pub mod connection;
pub mod router;
pub mod session;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use api::{ChatBackend, ConversationKind, ConversationSummary, CredentialProvider,
    StaticCredential, UserProfile};
pub use connection::{ConnectionManager, Link, LinkState};
pub use router::{EventRouter, FrameHandler, InboundKind};
pub use session::{
    AppEvent, Conversation, ConversationClient, ConversationSession, PageStats,
};
