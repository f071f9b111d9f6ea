//! Core identifier and time types for Chatwire
//!
//! Identifiers use newtype patterns over UUIDs for type safety; time is
//! injected through the [`TimeSource`] trait so every state machine in this
//! crate can be driven deterministically in tests.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Identifiers
// ----------------------------------------------------------------------------

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_newtype! {
    /// Unique identifier for a user account
    UserId
}

uuid_newtype! {
    /// Unique identifier for a conversation
    ConversationId
}

uuid_newtype! {
    /// Unique identifier for a message
    ///
    /// Locally originated messages pick their id client-side; the endpoint
    /// persists that same id, so a local id and its confirmed counterpart
    /// compare equal.
    MessageId
}

uuid_newtype! {
    /// Client-generated token attached to every retransmission of the same
    /// logical send, letting the endpoint de-duplicate repeated attempts
    IdempotencyKey
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Add a duration to this timestamp
    pub fn add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps to the core state machines
///
/// Implementations should be monotonic for the lifetime of a session.
pub trait TimeSource {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// System clock implementation of [`TimeSource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_millis() as u64)
    }
}

// ----------------------------------------------------------------------------
// Mock Time Source (testing)
// ----------------------------------------------------------------------------

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::{TimeSource, Timestamp};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Manually advanced clock for deterministic tests
    #[derive(Debug, Clone, Default)]
    pub struct MockTimeSource {
        millis: Arc<AtomicU64>,
    }

    impl MockTimeSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the absolute time in milliseconds
        pub fn set_time(&self, millis: u64) {
            self.millis.store(millis, Ordering::SeqCst);
        }

        /// Advance the clock by the given number of milliseconds
        pub fn advance(&self, millis: u64) {
            self.millis.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeSource for MockTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.millis.load(Ordering::SeqCst))
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub use mock::MockTimeSource;

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
