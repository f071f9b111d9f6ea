//! Read receipt tracking
//!
//! Outbound receipts are sent at most once per message per client session,
//! gated on a visibility threshold. Inbound receipts accumulate into
//! per-message reader sets that only ever grow.

use std::collections::{HashMap, HashSet};

use crate::config::ReceiptConfig;
use crate::types::{MessageId, UserId};

/// Tracks sent receipts and per-message reader sets
pub struct ReadReceipts {
    config: ReceiptConfig,
    /// Messages this session has already receipted
    sent: HashSet<MessageId>,
    /// Message -> participants who have read it
    readers: HashMap<MessageId, HashSet<UserId>>,
}

impl ReadReceipts {
    pub fn new(config: ReceiptConfig) -> Self {
        Self {
            config,
            sent: HashSet::new(),
            readers: HashMap::new(),
        }
    }

    /// Decide whether a receipt should go on the wire for this sighting
    ///
    /// Returns true exactly once per message, and only when enough of it is
    /// visible; later sightings of the same message are swallowed.
    pub fn should_send(&mut self, message: MessageId, visible_fraction: f32) -> bool {
        if visible_fraction < self.config.visibility_threshold {
            return false;
        }
        self.sent.insert(message)
    }

    /// Record an inbound receipt; returns true when the reader is new
    pub fn record(&mut self, message: MessageId, reader: UserId) -> bool {
        self.readers.entry(message).or_default().insert(reader)
    }

    /// Readers of a message, in stable order
    pub fn readers_of(&self, message: MessageId) -> Vec<UserId> {
        let mut readers: Vec<_> = self
            .readers
            .get(&message)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        readers.sort();
        readers
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn receipts() -> ReadReceipts {
        ReadReceipts::new(ReceiptConfig {
            visibility_threshold: 0.6,
        })
    }

    #[test]
    fn test_receipt_sent_at_most_once() {
        let mut receipts = receipts();
        let message = MessageId::generate();

        assert!(!receipts.should_send(message, 0.5));
        assert!(receipts.should_send(message, 0.8));
        // Message stays visible across many viewport recalculations
        assert!(!receipts.should_send(message, 0.9));
        assert!(!receipts.should_send(message, 1.0));
    }

    #[test]
    fn test_below_threshold_does_not_consume_the_send() {
        let mut receipts = receipts();
        let message = MessageId::generate();

        assert!(!receipts.should_send(message, 0.2));
        assert!(receipts.should_send(message, 0.6));
    }

    #[test]
    fn test_reader_sets_are_monotonic() {
        let mut receipts = receipts();
        let message = MessageId::generate();
        let alice = UserId::generate();
        let bob = UserId::generate();

        assert!(receipts.record(message, alice));
        assert!(receipts.record(message, bob));
        // Repeated receipts never shrink or double-count
        assert!(!receipts.record(message, alice));
        assert_eq!(receipts.readers_of(message).len(), 2);
    }

    #[test]
    fn test_unknown_message_has_no_readers() {
        let receipts = receipts();
        assert!(receipts.readers_of(MessageId::generate()).is_empty());
    }
}
