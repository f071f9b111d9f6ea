//! Basic Chatwire usage example
//!
//! Connects to a conversation endpoint, sends a message, and prints the app
//! events the session emits. Expects an endpoint at CHATWIRE_ENDPOINT
//! (default ws://localhost:8000) plus CHATWIRE_TOKEN, CHATWIRE_CONVERSATION,
//! and CHATWIRE_USER.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatwire_core::history::{Cursor, Page};
use chatwire_core::types::{ConversationId, UserId};
use chatwire_core::ChatwireConfig;
use chatwire_runtime::api::{ChatBackend, ConversationKind, ConversationSummary, UserProfile};
use chatwire_runtime::{Conversation, StaticCredential};

/// Pagination-only backend stand-in; a real application would point this at
/// the endpoint's REST API
struct EmptyBackend;

#[async_trait]
impl ChatBackend for EmptyBackend {
    async fn message_page(
        &self,
        _conversation: ConversationId,
        _before: Option<Cursor>,
        _limit: usize,
    ) -> chatwire_core::Result<Page> {
        Ok(Page {
            messages: Vec::new(),
            has_more: false,
            next_cursor: None,
        })
    }

    async fn list_conversations(&self) -> chatwire_core::Result<Vec<ConversationSummary>> {
        Ok(Vec::new())
    }

    async fn create_conversation(
        &self,
        _kind: ConversationKind,
        _participants: Vec<UserId>,
    ) -> chatwire_core::Result<ConversationSummary> {
        Err(chatwire_core::ChatwireError::backend_error("not available"))
    }

    async fn user_by_email(&self, _email: &str) -> chatwire_core::Result<Option<UserProfile>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    let endpoint =
        std::env::var("CHATWIRE_ENDPOINT").unwrap_or_else(|_| "ws://localhost:8000".into());
    let token = std::env::var("CHATWIRE_TOKEN").unwrap_or_else(|_| "dev-token".into());
    let conversation_id: ConversationId = std::env::var("CHATWIRE_CONVERSATION")
        .map(|raw| raw.parse().expect("invalid conversation id"))
        .unwrap_or_else(|_| ConversationId::generate());
    let local_user: UserId = std::env::var("CHATWIRE_USER")
        .map(|raw| raw.parse().expect("invalid user id"))
        .unwrap_or_else(|_| UserId::generate());

    let mut conversation = Conversation::open(
        &endpoint,
        conversation_id,
        local_user,
        Arc::new(StaticCredential::new(token)),
        Arc::new(EmptyBackend),
        ChatwireConfig::default(),
    )?;

    let mut app_events = conversation.client.take_app_events().unwrap();
    let printer = tokio::spawn(async move {
        while let Some(event) = app_events.recv().await {
            println!("event: {event:?}");
        }
    });

    conversation.client.input_activity().await?;
    match conversation.client.send("hello from chatwire").await {
        Ok(message_id) => println!("delivered as {message_id}"),
        Err(e) => println!("delivery failed: {e}"),
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    conversation.close().await;
    printer.abort();
    Ok(())
}
