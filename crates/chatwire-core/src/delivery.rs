//! Outbound message delivery tracking
//!
//! Every locally originated send is registered as a [`PendingDelivery`] and
//! driven by a poll loop: the session ticks [`DeliveryTracker::poll`] on a
//! fixed interval and applies the returned [`DeliveryAction`]s. Because due
//! deadlines are discovered by polling rather than by per-record timers, a
//! deadline whose record has already been removed simply never fires.
//!
//! The idempotency key is generated once per logical send and reused
//! unchanged across every retransmission; the endpoint treats a repeated key
//! as a duplicate-suppression signal, not a new message.

use std::collections::BTreeMap;

use crate::config::DeliveryConfig;
use crate::frame::{ClientFrame, SendMessageFrame};
use crate::types::{MessageId, TimeSource, Timestamp};

// ----------------------------------------------------------------------------
// Delivery Phase
// ----------------------------------------------------------------------------

/// Lifecycle phase of a pending delivery
///
/// Transmission moves `Queued -> AwaitingAck`; an ack deadline on a live link
/// retransmits (`AwaitingAck -> AwaitingAck`), on a dead link re-queues, and
/// past the attempt cap the record is removed as exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    /// Waiting for an open link; re-checked on the queue schedule
    Queued,
    /// Transmitted, ack deadline running
    AwaitingAck,
}

// ----------------------------------------------------------------------------
// Pending Delivery
// ----------------------------------------------------------------------------

/// A locally originated message awaiting server acknowledgment
#[derive(Debug, Clone)]
pub struct PendingDelivery {
    /// Full frame body; resent unchanged on every attempt
    pub frame: SendMessageFrame,
    /// Current phase
    pub phase: DeliveryPhase,
    /// Transmissions performed so far
    pub attempts: u32,
    /// Deferred link re-checks while queued (does not count as attempts)
    pub deferrals: u32,
    /// When the send was registered
    pub created_at: Timestamp,
    /// Next due time: queue re-check or ack deadline, depending on phase
    pub next_action_at: Timestamp,
}

impl PendingDelivery {
    /// The client-chosen message id for this delivery
    pub fn local_id(&self) -> MessageId {
        self.frame.message_id
    }
}

// ----------------------------------------------------------------------------
// Poll Actions and Ack Disposition
// ----------------------------------------------------------------------------

/// Work produced by a poll pass, applied by the caller in order
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryAction {
    /// Transmit this frame over the link
    Transmit(ClientFrame),
    /// Attempts exhausted; reject the caller and mark the entry failed
    GiveUp { local_id: MessageId, attempts: u32 },
}

/// Outcome of processing an acknowledgment frame
#[derive(Debug, Clone, PartialEq)]
pub enum AckDisposition {
    /// Delivery confirmed; record removed
    Confirmed {
        local_id: MessageId,
        server_id: MessageId,
    },
    /// Endpoint rejected the message; record removed, never retried
    Rejected {
        local_id: MessageId,
        reason: String,
    },
    /// No record for this id (late or duplicate ack); nothing to do
    Unknown,
}

// ----------------------------------------------------------------------------
// Delivery Tracker
// ----------------------------------------------------------------------------

/// Tracks pending deliveries and drives retransmission
pub struct DeliveryTracker<T: TimeSource> {
    config: DeliveryConfig,
    pending: BTreeMap<MessageId, PendingDelivery>,
    time_source: T,
}

impl<T: TimeSource> DeliveryTracker<T> {
    /// Create a tracker with the given configuration
    pub fn new(config: DeliveryConfig, time_source: T) -> Self {
        Self {
            config,
            pending: BTreeMap::new(),
            time_source,
        }
    }

    /// Register a new send; the record starts `Queued` and is picked up by
    /// the next poll (immediately transmitted when the link is open)
    pub fn register(&mut self, frame: SendMessageFrame) -> MessageId {
        let now = self.time_source.now();
        let local_id = frame.message_id;
        let record = PendingDelivery {
            frame,
            phase: DeliveryPhase::Queued,
            attempts: 0,
            deferrals: 0,
            created_at: now,
            next_action_at: now,
        };
        self.pending.insert(local_id, record);
        local_id
    }

    /// Advance every record against the current time and link state
    pub fn poll(&mut self, link_open: bool) -> Vec<DeliveryAction> {
        let now = self.time_source.now();
        let mut actions = Vec::new();
        let mut exhausted = Vec::new();

        for record in self.pending.values_mut() {
            if now < record.next_action_at {
                continue;
            }

            match record.phase {
                DeliveryPhase::Queued => {
                    if link_open {
                        record.attempts += 1;
                        record.phase = DeliveryPhase::AwaitingAck;
                        record.next_action_at = now.add(self.config.ack_timeout);
                        actions.push(DeliveryAction::Transmit(ClientFrame::SendMessage(
                            record.frame.clone(),
                        )));
                    } else {
                        // Not an attempt: just schedule the next link check
                        let delay = self.config.queue_schedule.delay(record.deferrals);
                        record.deferrals += 1;
                        record.next_action_at = now.add(delay);
                    }
                }
                DeliveryPhase::AwaitingAck => {
                    if record.attempts >= self.config.max_attempts {
                        exhausted.push(record.local_id());
                    } else if link_open {
                        record.attempts += 1;
                        record.next_action_at = now.add(self.config.ack_timeout);
                        actions.push(DeliveryAction::Transmit(ClientFrame::SendMessage(
                            record.frame.clone(),
                        )));
                    } else {
                        // The link died under the deadline; wait for it to
                        // come back instead of burning attempts
                        record.phase = DeliveryPhase::Queued;
                        record.deferrals = 0;
                        record.next_action_at = now;
                    }
                }
            }
        }

        for local_id in exhausted {
            if let Some(record) = self.pending.remove(&local_id) {
                tracing::warn!(%local_id, attempts = record.attempts, "delivery exhausted");
                actions.push(DeliveryAction::GiveUp {
                    local_id,
                    attempts: record.attempts,
                });
            }
        }

        actions
    }

    /// Process an acknowledgment frame; removes the record so no retry can
    /// be scheduled after confirmation
    pub fn acknowledge(
        &mut self,
        message_id: MessageId,
        success: bool,
        server_id: Option<MessageId>,
        error: Option<String>,
    ) -> AckDisposition {
        let Some(record) = self.pending.remove(&message_id) else {
            return AckDisposition::Unknown;
        };

        if success {
            AckDisposition::Confirmed {
                local_id: record.local_id(),
                server_id: server_id.unwrap_or(message_id),
            }
        } else {
            AckDisposition::Rejected {
                local_id: record.local_id(),
                reason: error.unwrap_or_else(|| "rejected by server".into()),
            }
        }
    }

    /// Drop every record, returning the ids whose callers are still waiting
    pub fn cancel_all(&mut self) -> Vec<MessageId> {
        let ids = self.pending.keys().copied().collect();
        self.pending.clear();
        ids
    }

    /// Look up a pending record
    pub fn get(&self, local_id: &MessageId) -> Option<&PendingDelivery> {
        self.pending.get(local_id)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no deliveries are pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
