//! Error types for the Chatwire client
//!
//! The taxonomy distinguishes fatal-per-attempt failures (missing
//! credential), transient transport faults (retried, not surfaced), and
//! terminal delivery outcomes (exhausted retries, explicit server rejection,
//! teardown cancellation).

// ----------------------------------------------------------------------------
// Transport Errors
// ----------------------------------------------------------------------------

/// Failures at the WebSocket transport layer
///
/// These are transient from the caller's perspective: the connection manager
/// retries them per its backoff policy and only the exhausted cap surfaces.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },
    #[error("send failed: {reason}")]
    SendFailed { reason: String },
    #[error("connection closed: {reason}")]
    Closed { reason: String },
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },
    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

// ----------------------------------------------------------------------------
// Chatwire Error
// ----------------------------------------------------------------------------

/// Unified error type for the Chatwire client
#[derive(Debug, thiserror::Error)]
pub enum ChatwireError {
    /// No bearer token was available at connect time
    #[error("no credential available for connection")]
    CredentialMissing,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Ack retries exhausted for an outbound message
    #[error("delivery failed after {attempts} attempts")]
    DeliveryFailed { attempts: u32 },

    /// The endpoint explicitly rejected the message; never retried
    #[error("server rejected message: {reason}")]
    ServerRejected { reason: String },

    /// Teardown interrupted an in-flight operation
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// Internal channel closed unexpectedly
    #[error("channel error: {message}")]
    Channel { message: String },

    /// Collaborating HTTP backend failure
    #[error("backend error: {reason}")]
    Backend { reason: String },
}

impl ChatwireError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChatwireError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a channel error with a message
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        ChatwireError::Channel {
            message: message.into(),
        }
    }

    /// Create a backend error with a reason
    pub fn backend_error<T: Into<String>>(reason: T) -> Self {
        ChatwireError::Backend {
            reason: reason.into(),
        }
    }

    /// Create a transport connection-failed error
    pub fn connection_failed<E: Into<String>, R: Into<String>>(endpoint: E, reason: R) -> Self {
        ChatwireError::Transport(TransportError::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ChatwireError>;
