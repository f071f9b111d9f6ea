//! Client-visible conversation history and reconciliation
//!
//! History is an ordered list, newest first, mixing server-confirmed
//! messages with optimistic placeholders for sends that have not been
//! acknowledged yet. Reconciliation decides, for every inbound confirmed
//! message, whether it replaces an optimistic entry in place or is inserted
//! as new history; the wire is at-least-once, so already-seen ids are
//! dropped to keep history at-most-once.
//!
//! The endpoint persists the client-chosen message id, which makes the
//! common reconciliation path an exact id match; the sender/content/recency
//! heuristic remains as fallback for echoes that lost the id linkage.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use core::fmt;
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, MessageKind};
use crate::types::{ConversationId, IdempotencyKey, MessageId, TimeSource, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Pagination Cursor and Page
// ----------------------------------------------------------------------------

/// Opaque pagination cursor; values decrease monotonically as history is
/// walked toward older messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(DateTime<Utc>);

impl Cursor {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// One page of older history from the backend, oldest message last
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub next_cursor: Option<Cursor>,
}

// ----------------------------------------------------------------------------
// Optimistic Entries
// ----------------------------------------------------------------------------

/// Delivery-facing status of an optimistic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Submitted, no acknowledgment yet
    Sending,
    /// Acknowledged but not yet replaced by a confirmed record
    Sent,
    /// Delivery exhausted or rejected; kept visible for user retry
    Failed,
}

/// Locally rendered placeholder for a message not yet confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticEntry {
    pub local_id: MessageId,
    pub idempotency_key: IdempotencyKey,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageKind,
    pub reply_to: Option<MessageId>,
    pub message_metadata: Option<serde_json::Value>,
    /// Local clock reading at submission, used by the recency heuristic
    pub queued_at: Timestamp,
    pub status: EntryStatus,
}

/// One item of client-visible history
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Confirmed(ChatMessage),
    Optimistic(OptimisticEntry),
}

impl HistoryEntry {
    /// Message identity of this entry (local id until confirmed)
    pub fn message_id(&self) -> MessageId {
        match self {
            HistoryEntry::Confirmed(message) => message.id,
            HistoryEntry::Optimistic(entry) => entry.local_id,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, HistoryEntry::Optimistic(_))
    }
}

// ----------------------------------------------------------------------------
// Reconciliation Outcome
// ----------------------------------------------------------------------------

/// What happened to an inbound confirmed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Replaced an optimistic entry in place
    Replaced { local_id: MessageId },
    /// Inserted as new history
    Inserted,
    /// Already present; dropped
    Duplicate,
}

// ----------------------------------------------------------------------------
// Conversation History
// ----------------------------------------------------------------------------

/// Ordered client-visible history for one conversation, newest first
pub struct ConversationHistory<T: TimeSource> {
    conversation_id: ConversationId,
    /// The local user; only their messages are candidates for echo matching
    local_user: UserId,
    entries: Vec<HistoryEntry>,
    /// Confirmed ids already in history (duplicate suppression)
    seen: HashSet<MessageId>,
    echo_window: Duration,
    oldest_cursor: Option<Cursor>,
    has_more: bool,
    time_source: T,
}

impl<T: TimeSource> ConversationHistory<T> {
    pub fn new(
        conversation_id: ConversationId,
        local_user: UserId,
        echo_window: Duration,
        time_source: T,
    ) -> Self {
        Self {
            conversation_id,
            local_user,
            entries: Vec::new(),
            seen: HashSet::new(),
            echo_window,
            oldest_cursor: None,
            has_more: true,
            time_source,
        }
    }

    /// The conversation this history belongs to
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Current entries, newest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cursor for fetching the next page of older history
    pub fn older_cursor(&self) -> Option<Cursor> {
        self.oldest_cursor
    }

    /// Whether older history may remain on the server
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Add a freshly submitted message as the newest entry
    pub fn push_optimistic(&mut self, entry: OptimisticEntry) {
        self.entries.insert(0, HistoryEntry::Optimistic(entry));
    }

    /// Confirm an optimistic entry in place from its acknowledgment
    ///
    /// With a server timestamp the entry becomes a full confirmed record;
    /// without one (duplicate-suppressed ack) it is marked `Sent` and left
    /// for the echo to finish. Returns false when the entry is gone.
    pub fn resolve_local(
        &mut self,
        local_id: MessageId,
        server_id: MessageId,
        timestamp: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(index) = self.optimistic_index(local_id) else {
            return false;
        };

        let HistoryEntry::Optimistic(entry) = &mut self.entries[index] else {
            return false;
        };

        match timestamp {
            Some(at) => {
                let message = ChatMessage {
                    id: server_id,
                    conversation_id: self.conversation_id,
                    sender_id: entry.sender_id,
                    content: entry.content.clone(),
                    message_type: entry.message_type,
                    created_at: at,
                    updated_at: at,
                    edited: false,
                    reply_to: entry.reply_to,
                    message_metadata: entry.message_metadata.take(),
                    reactions: Vec::new(),
                    read_by: Vec::new(),
                };
                self.entries[index] = HistoryEntry::Confirmed(message);
                self.seen.insert(server_id);
            }
            None => {
                entry.status = EntryStatus::Sent;
            }
        }
        true
    }

    /// Mark an optimistic entry failed in place; never removes it
    pub fn mark_failed(&mut self, local_id: MessageId) -> bool {
        if let Some(index) = self.optimistic_index(local_id) {
            if let HistoryEntry::Optimistic(entry) = &mut self.entries[index] {
                entry.status = EntryStatus::Failed;
                return true;
            }
        }
        false
    }

    /// Merge an inbound confirmed message into history
    pub fn insert_confirmed(&mut self, message: ChatMessage) -> InsertOutcome {
        if self.seen.contains(&message.id) {
            tracing::debug!(message_id = %message.id, "dropping duplicate confirmed message");
            return InsertOutcome::Duplicate;
        }

        // Exact match: the endpoint keeps the client-chosen id
        if let Some(index) = self.optimistic_index(message.id) {
            return self.replace_at(index, message);
        }

        // Heuristic echo match for locally sent content
        if message.sender_id == self.local_user {
            if let Some(index) = self.echo_candidate(&message) {
                return self.replace_at(index, message);
            }
        }

        self.seen.insert(message.id);
        let index = self.insertion_index(message.created_at);
        self.entries.insert(index, HistoryEntry::Confirmed(message));
        InsertOutcome::Inserted
    }

    /// Append a page of older history to the older end
    ///
    /// Returns the number of entries actually appended (seen ids skipped).
    pub fn merge_older(&mut self, page: Page) -> usize {
        let mut appended = 0;
        // Pages arrive oldest-last once flipped; walk newest-to-oldest so
        // appends preserve reverse-chronological order
        let mut messages = page.messages;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for message in messages {
            if !self.seen.insert(message.id) {
                continue;
            }
            self.entries.push(HistoryEntry::Confirmed(message));
            appended += 1;
        }
        self.has_more = page.has_more;
        if page.next_cursor.is_some() {
            self.oldest_cursor = page.next_cursor;
        }
        appended
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    fn optimistic_index(&self, local_id: MessageId) -> Option<usize> {
        self.entries.iter().position(|entry| {
            matches!(entry, HistoryEntry::Optimistic(e) if e.local_id == local_id)
        })
    }

    fn echo_candidate(&self, message: &ChatMessage) -> Option<usize> {
        let now = self.time_source.now();
        self.entries.iter().position(|entry| match entry {
            HistoryEntry::Optimistic(e) => {
                e.status != EntryStatus::Failed
                    && e.sender_id == message.sender_id
                    && e.content == message.content
                    && (e.status == EntryStatus::Sending
                        || now.duration_since(e.queued_at) <= self.echo_window)
            }
            HistoryEntry::Confirmed(_) => false,
        })
    }

    fn replace_at(&mut self, index: usize, message: ChatMessage) -> InsertOutcome {
        let local_id = self.entries[index].message_id();
        self.seen.insert(message.id);
        self.entries[index] = HistoryEntry::Confirmed(message);
        InsertOutcome::Replaced { local_id }
    }

    /// First position that keeps confirmed entries in descending
    /// created_at order; optimistic entries float above their neighbors
    fn insertion_index(&self, created_at: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .position(|entry| match entry {
                HistoryEntry::Confirmed(m) => m.created_at <= created_at,
                HistoryEntry::Optimistic(_) => false,
            })
            .unwrap_or(self.entries.len())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
