//! Typing indicator coalescing
//!
//! Outbound: a start signal on the first keystroke after idle, a stop signal
//! after a quiet period or immediately when the input is cleared. Inbound:
//! remote typists expire after an inactivity window whether or not their
//! stop signal ever arrives, so a lost frame cannot leave a stale indicator.

use std::collections::HashMap;

use crate::config::TypingConfig;
use crate::types::{TimeSource, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Typing Signal
// ----------------------------------------------------------------------------

/// Outbound typing transition to put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingSignal {
    Started,
    Stopped,
}

// ----------------------------------------------------------------------------
// Typing Tracker
// ----------------------------------------------------------------------------

/// Coalesces local keystrokes into typing frames and tracks remote typists
pub struct TypingTracker<T: TimeSource> {
    config: TypingConfig,
    /// Whether we have an un-stopped start signal on the wire
    announcing: bool,
    last_keystroke: Option<Timestamp>,
    /// Remote participant -> last signal time
    remote: HashMap<UserId, Timestamp>,
    time_source: T,
}

impl<T: TimeSource> TypingTracker<T> {
    pub fn new(config: TypingConfig, time_source: T) -> Self {
        Self {
            config,
            announcing: false,
            last_keystroke: None,
            remote: HashMap::new(),
            time_source,
        }
    }

    // ------------------------------------------------------------------
    // Outbound side
    // ------------------------------------------------------------------

    /// Record a keystroke; returns a start signal on the first one after idle
    pub fn keystroke(&mut self) -> Option<TypingSignal> {
        self.last_keystroke = Some(self.time_source.now());
        if self.announcing {
            None
        } else {
            self.announcing = true;
            Some(TypingSignal::Started)
        }
    }

    /// The input was cleared; stop immediately if a start is outstanding
    pub fn input_cleared(&mut self) -> Option<TypingSignal> {
        self.last_keystroke = None;
        if self.announcing {
            self.announcing = false;
            Some(TypingSignal::Stopped)
        } else {
            None
        }
    }

    /// Emit a stop signal once the quiet period has elapsed
    pub fn poll_outbound(&mut self) -> Option<TypingSignal> {
        if !self.announcing {
            return None;
        }
        let now = self.time_source.now();
        let quiet = match self.last_keystroke {
            Some(at) => now.duration_since(at) >= self.config.quiet_period,
            None => true,
        };
        if quiet {
            self.announcing = false;
            self.last_keystroke = None;
            Some(TypingSignal::Stopped)
        } else {
            None
        }
    }

    // ------------------------------------------------------------------
    // Inbound side
    // ------------------------------------------------------------------

    /// Apply a remote typing frame; returns true when the active set changed
    pub fn observe(&mut self, user: UserId, is_typing: bool) -> bool {
        if is_typing {
            self.remote.insert(user, self.time_source.now()).is_none()
        } else {
            self.remote.remove(&user).is_some()
        }
    }

    /// Expire stale remote typists; returns true when the active set changed
    pub fn poll_remote(&mut self) -> bool {
        let now = self.time_source.now();
        let expiry = self.config.remote_expiry;
        let before = self.remote.len();
        self.remote
            .retain(|_, last| now.duration_since(*last) < expiry);
        self.remote.len() != before
    }

    /// Currently active remote typists, in stable order
    pub fn active_typists(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.remote.keys().copied().collect();
        users.sort();
        users
    }

    /// Forget all remote state (link loss)
    pub fn clear_remote(&mut self) -> bool {
        let changed = !self.remote.is_empty();
        self.remote.clear();
        changed
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MockTimeSource;
    use core::time::Duration;

    fn tracker(clock: &MockTimeSource) -> TypingTracker<MockTimeSource> {
        let config = TypingConfig {
            quiet_period: Duration::from_millis(1500),
            remote_expiry: Duration::from_secs(4),
        };
        TypingTracker::new(config, clock.clone())
    }

    #[test]
    fn test_start_signal_only_on_first_keystroke() {
        let clock = MockTimeSource::new();
        let mut typing = tracker(&clock);

        assert_eq!(typing.keystroke(), Some(TypingSignal::Started));
        clock.advance(100);
        assert_eq!(typing.keystroke(), None);
        assert_eq!(typing.keystroke(), None);
    }

    #[test]
    fn test_stop_after_quiet_period() {
        let clock = MockTimeSource::new();
        let mut typing = tracker(&clock);

        typing.keystroke();
        clock.advance(1000);
        assert_eq!(typing.poll_outbound(), None);

        // Another keystroke pushes the quiet deadline out
        typing.keystroke();
        clock.advance(1000);
        assert_eq!(typing.poll_outbound(), None);

        clock.advance(600);
        assert_eq!(typing.poll_outbound(), Some(TypingSignal::Stopped));
        // And a new keystroke starts a fresh announcement
        assert_eq!(typing.keystroke(), Some(TypingSignal::Started));
    }

    #[test]
    fn test_clear_stops_immediately() {
        let clock = MockTimeSource::new();
        let mut typing = tracker(&clock);

        typing.keystroke();
        assert_eq!(typing.input_cleared(), Some(TypingSignal::Stopped));
        // Idempotent when nothing is announced
        assert_eq!(typing.input_cleared(), None);
        assert_eq!(typing.poll_outbound(), None);
    }

    #[test]
    fn test_remote_typist_expires_without_stop_signal() {
        let clock = MockTimeSource::new();
        let mut typing = tracker(&clock);
        let user = UserId::generate();

        assert!(typing.observe(user, true));
        assert_eq!(typing.active_typists(), vec![user]);

        clock.advance(3999);
        assert!(!typing.poll_remote());
        clock.advance(1);
        assert!(typing.poll_remote());
        assert!(typing.active_typists().is_empty());
    }

    #[test]
    fn test_remote_stop_signal_removes() {
        let clock = MockTimeSource::new();
        let mut typing = tracker(&clock);
        let user = UserId::generate();

        typing.observe(user, true);
        assert!(typing.observe(user, false));
        assert!(typing.active_typists().is_empty());
        // Stop for an unknown user changes nothing
        assert!(!typing.observe(UserId::generate(), false));
    }

    #[test]
    fn test_repeated_start_refreshes_expiry() {
        let clock = MockTimeSource::new();
        let mut typing = tracker(&clock);
        let user = UserId::generate();

        typing.observe(user, true);
        clock.advance(3000);
        // A repeated start is not a set change, but refreshes the clock
        assert!(!typing.observe(user, true));
        clock.advance(3000);
        assert!(!typing.poll_remote());
        assert_eq!(typing.active_typists(), vec![user]);
    }
}
