//! Property-based tests for history reconciliation
//!
//! These tests verify the at-most-once invariant: no interleaving of
//! optimistic inserts, acks, and server echoes produces a duplicate logical
//! message, and confirmed history stays in reverse-chronological order.

use chatwire_core::history::{ConversationHistory, HistoryEntry, OptimisticEntry};
use chatwire_core::message::{ChatMessage, MessageKind};
use chatwire_core::types::{
    ConversationId, IdempotencyKey, MessageId, MockTimeSource, TimeSource, UserId,
};
use chatwire_core::EntryStatus;
use chrono::{DateTime, TimeZone, Utc};
use core::time::Duration;
use proptest::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

const ECHO_WINDOW: Duration = Duration::from_secs(10);

fn wire_time(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

/// Deterministic ids so interleavings can refer to the same logical message
fn nth_id(n: u8) -> MessageId {
    MessageId::from_uuid(Uuid::from_u128(0x1000 + n as u128))
}

fn confirmed(
    conversation: ConversationId,
    sender: UserId,
    id: MessageId,
    content: &str,
    offset_secs: i64,
) -> ChatMessage {
    let at = wire_time(offset_secs);
    ChatMessage {
        id,
        conversation_id: conversation,
        sender_id: sender,
        content: content.into(),
        message_type: MessageKind::Text,
        created_at: at,
        updated_at: at,
        edited: false,
        reply_to: None,
        message_metadata: None,
        reactions: Vec::new(),
        read_by: Vec::new(),
    }
}

/// One step of a simulated session
#[derive(Debug, Clone)]
enum Step {
    /// Local user submits message number `n`
    Submit(u8),
    /// Server echo of message number `n` arrives
    Echo(u8),
    /// A message from another participant arrives
    Remote { id: u8, offset_secs: i64 },
    /// Wall clock advances
    Advance(u64),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0u8..8).prop_map(Step::Submit),
        (0u8..8).prop_map(Step::Echo),
        ((100u8..140), (0i64..120)).prop_map(|(id, offset_secs)| Step::Remote {
            id,
            offset_secs
        }),
        (0u64..20_000).prop_map(Step::Advance),
    ]
}

fn logical_ids(history: &ConversationHistory<MockTimeSource>) -> Vec<MessageId> {
    history
        .entries()
        .iter()
        .map(HistoryEntry::message_id)
        .collect()
}

proptest! {
    /// Property: no interleaving of submits, echoes, and remote arrivals
    /// ever leaves two entries for the same logical message
    #[test]
    fn no_duplicate_logical_messages(steps in prop::collection::vec(arb_step(), 1..60)) {
        let clock = MockTimeSource::new();
        clock.set_time(1_000_000);
        let me = UserId::generate();
        let other = UserId::generate();
        let conversation = ConversationId::generate();
        let mut history =
            ConversationHistory::new(conversation, me, ECHO_WINDOW, clock.clone());
        let mut submitted: HashSet<u8> = HashSet::new();

        for step in steps {
            match step {
                Step::Submit(n) => {
                    // At most one live submission per logical message
                    if submitted.insert(n) {
                        history.push_optimistic(OptimisticEntry {
                            local_id: nth_id(n),
                            idempotency_key: IdempotencyKey::generate(),
                            sender_id: me,
                            content: format!("message-{n}"),
                            message_type: MessageKind::Text,
                            reply_to: None,
                            message_metadata: None,
                            queued_at: clock.now(),
                            status: EntryStatus::Sending,
                        });
                    }
                }
                Step::Echo(n) => {
                    // An echo only exists for something actually submitted
                    if submitted.contains(&n) {
                        let echo = confirmed(
                            conversation,
                            me,
                            nth_id(n),
                            &format!("message-{n}"),
                            n as i64,
                        );
                        history.insert_confirmed(echo);
                    }
                }
                Step::Remote { id, offset_secs } => {
                    let message =
                        confirmed(conversation, other, nth_id(id), "from-remote", offset_secs);
                    history.insert_confirmed(message);
                }
                Step::Advance(millis) => clock.advance(millis),
            }
        }

        let ids = logical_ids(&history);
        let unique: HashSet<_> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), unique.len(), "duplicate logical message in history");
    }

    /// Property: confirmed entries are always in reverse-chronological order
    #[test]
    fn confirmed_history_is_newest_first(steps in prop::collection::vec(arb_step(), 1..60)) {
        let clock = MockTimeSource::new();
        clock.set_time(1_000_000);
        let me = UserId::generate();
        let other = UserId::generate();
        let conversation = ConversationId::generate();
        let mut history =
            ConversationHistory::new(conversation, me, ECHO_WINDOW, clock.clone());

        for step in steps {
            match step {
                Step::Submit(_) | Step::Echo(_) => {
                    // Ordering is exercised through remote arrivals here;
                    // echo placement is covered by the duplicate property
                }
                Step::Remote { id, offset_secs } => {
                    let message =
                        confirmed(conversation, other, nth_id(id), "from-remote", offset_secs);
                    history.insert_confirmed(message);
                }
                Step::Advance(millis) => clock.advance(millis),
            }
        }

        let confirmed_times: Vec<_> = history
            .entries()
            .iter()
            .filter_map(|entry| match entry {
                HistoryEntry::Confirmed(m) => Some(m.created_at),
                HistoryEntry::Optimistic(_) => None,
            })
            .collect();

        for pair in confirmed_times.windows(2) {
            prop_assert!(pair[0] >= pair[1], "history not newest-first");
        }
    }
}
