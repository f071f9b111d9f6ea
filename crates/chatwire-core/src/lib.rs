//! Chatwire core state machines
//!
//! This crate holds the deterministic half of the Chatwire real-time
//! messaging client: wire frame definitions, outbound delivery tracking with
//! idempotent retransmission, optimistic history reconciliation, and
//! ephemeral signal coalescing (typing, read receipts, presence). Nothing in
//! here performs IO; time enters through [`types::TimeSource`] and the
//! runtime crate drives every state machine from a single task.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod delivery;
pub mod errors;
pub mod frame;
pub mod history;
pub mod message;
pub mod presence;
pub mod receipts;
pub mod retry;
pub mod types;
pub mod typing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::ChatwireConfig;
pub use delivery::{AckDisposition, DeliveryAction, DeliveryPhase, DeliveryTracker, PendingDelivery};
pub use errors::{ChatwireError, Result, TransportError};
pub use frame::{AckStatus, ClientFrame, SendMessageFrame, ServerFrame};
pub use history::{
    ConversationHistory, Cursor, EntryStatus, HistoryEntry, InsertOutcome, OptimisticEntry, Page,
};
pub use message::{ChatMessage, MessageKind, Reaction};
pub use presence::PresenceSet;
pub use receipts::ReadReceipts;
pub use types::{
    ConversationId, IdempotencyKey, MessageId, SystemTimeSource, TimeSource, Timestamp, UserId,
};
pub use typing::{TypingSignal, TypingTracker};

#[cfg(any(test, feature = "testing"))]
pub use types::MockTimeSource;
