//! Centralized configuration for the Chatwire client
//!
//! One struct per concern, gathered under [`ChatwireConfig`]. Defaults match
//! a human-paced chat session; `testing()` shrinks every timer so the full
//! retry machinery runs inside a fast test.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::retry::{ExponentialBackoff, FixedSchedule};

// ----------------------------------------------------------------------------
// Delivery Configuration
// ----------------------------------------------------------------------------

/// Configuration for outbound message delivery and retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum transmissions per message before it is failed
    pub max_attempts: u32,
    /// How long to wait for an acknowledgment after each transmission
    pub ack_timeout: Duration,
    /// Pacing for link re-checks while a message waits for a connection
    pub queue_schedule: FixedSchedule,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            ack_timeout: Duration::from_secs(5),
            queue_schedule: FixedSchedule::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Configuration for automatic reconnection after an unexpected close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub backoff: ExponentialBackoff,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff: ExponentialBackoff::default(),
        }
    }
}

// ----------------------------------------------------------------------------
// Reconcile Configuration
// ----------------------------------------------------------------------------

/// Configuration for merging confirmed messages into local history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Recency window within which a confirmed message may still be matched
    /// to an optimistic entry by sender and content
    pub echo_window: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            echo_window: Duration::from_secs(10),
        }
    }
}

// ----------------------------------------------------------------------------
// Typing Configuration
// ----------------------------------------------------------------------------

/// Configuration for typing-indicator throttling and expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingConfig {
    /// Quiet period after the last keystroke before a stop signal is sent
    pub quiet_period: Duration,
    /// Inactivity window after which a remote typist is considered stale
    pub remote_expiry: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(1500),
            remote_expiry: Duration::from_secs(4),
        }
    }
}

// ----------------------------------------------------------------------------
// Read Receipt Configuration
// ----------------------------------------------------------------------------

/// Configuration for read-receipt emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptConfig {
    /// Fraction of a message that must be visible before a receipt is sent
    pub visibility_threshold: f32,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: 0.6,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the session's internal channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Client handle -> session commands
    pub command_buffer_size: usize,
    /// Connection -> session inbound frames
    pub frame_buffer_size: usize,
    /// Session -> connection outbound frames
    pub outbound_buffer_size: usize,
    /// Session -> UI app events
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,    // user actions are infrequent
            frame_buffer_size: 128,     // inbound frames can be bursty
            outbound_buffer_size: 64,
            app_event_buffer_size: 128, // UI updates need headroom
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for a conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatwireConfig {
    pub delivery: DeliveryConfig,
    pub reconnect: ReconnectConfig,
    pub reconcile: ReconcileConfig,
    pub typing: TypingConfig,
    pub receipts: ReceiptConfig,
    pub channels: ChannelConfig,
    /// Interval on which the session polls its timer-driven state machines
    pub tick_interval: Duration,
}

impl Default for ChatwireConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            reconnect: ReconnectConfig::default(),
            reconcile: ReconcileConfig::default(),
            typing: TypingConfig::default(),
            receipts: ReceiptConfig::default(),
            channels: ChannelConfig::default(),
            tick_interval: Duration::from_millis(100),
        }
    }
}

impl ChatwireConfig {
    /// Configuration with every timer shrunk for fast tests
    pub fn testing() -> Self {
        Self {
            delivery: DeliveryConfig {
                max_attempts: 3,
                ack_timeout: Duration::from_millis(40),
                queue_schedule: FixedSchedule::new(vec![
                    Duration::from_millis(10),
                    Duration::from_millis(20),
                ]),
            },
            reconnect: ReconnectConfig {
                backoff: ExponentialBackoff {
                    base: Duration::from_millis(10),
                    max_delay: Duration::from_millis(80),
                    max_attempts: 3,
                },
            },
            reconcile: ReconcileConfig::default(),
            typing: TypingConfig {
                quiet_period: Duration::from_millis(30),
                remote_expiry: Duration::from_millis(60),
            },
            receipts: ReceiptConfig::default(),
            channels: ChannelConfig::default(),
            tick_interval: Duration::from_millis(5),
        }
    }

    /// Validate the configuration, returning a description of the first
    /// problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.delivery.max_attempts == 0 {
            return Err("delivery.max_attempts must be at least 1".into());
        }
        if self.delivery.ack_timeout.is_zero() {
            return Err("delivery.ack_timeout must be non-zero".into());
        }
        if self.delivery.queue_schedule.is_empty() {
            return Err("delivery.queue_schedule needs at least one step".into());
        }
        if self.reconnect.backoff.base.is_zero() {
            return Err("reconnect.backoff.base must be non-zero".into());
        }
        if !(0.0..=1.0).contains(&self.receipts.visibility_threshold) {
            return Err("receipts.visibility_threshold must be within [0, 1]".into());
        }
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be non-zero".into());
        }
        if self.channels.command_buffer_size == 0
            || self.channels.frame_buffer_size == 0
            || self.channels.outbound_buffer_size == 0
            || self.channels.app_event_buffer_size == 0
        {
            return Err("channel buffer sizes must be non-zero".into());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ChatwireConfig::default().validate().is_ok());
        assert!(ChatwireConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = ChatwireConfig::default();
        config.delivery.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_queue_schedule() {
        let mut config = ChatwireConfig::default();
        // An empty schedule can only arrive through deserialization
        config.delivery.queue_schedule = serde_json::from_str(r#"{"steps":[]}"#).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut config = ChatwireConfig::default();
        config.receipts.visibility_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
