//! Connection lifecycle management
//!
//! One [`ConnectionManager`] owns one WebSocket for one conversation. The
//! socket lives inside a spawned task; the session talks to it exclusively
//! through channels, and lifecycle transitions are published on a `watch`
//! channel of [`LinkState`]. Unexpected closes trigger reconnection with
//! exponential backoff; the attempt counter resets on every successful open
//! and `LinkState::Failed` is published once the cap is exhausted.
//!
//! Every code path out of the task drops the socket halves, so an opened
//! transport is released on normal close, reconnect, failure, and abort
//! alike.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use url::Url;

use chatwire_core::config::{ChannelConfig, ReconnectConfig};
use chatwire_core::frame::ClientFrame;
use chatwire_core::retry::ExponentialBackoff;
use chatwire_core::types::ConversationId;
use chatwire_core::{ChatwireError, Result};

use crate::api::CredentialProvider;

// ----------------------------------------------------------------------------
// Link State
// ----------------------------------------------------------------------------

/// Published lifecycle of the conversation link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    /// First connection attempt in progress
    Connecting,
    /// Socket is up; frames flow
    Open,
    /// Unexpected close; retrying with backoff
    Reconnecting { attempt: u32 },
    /// Caller-initiated close, or the manager was dropped
    Closed,
    /// Terminal: missing credential or reconnect cap exhausted
    Failed { reason: String },
}

impl LinkState {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkState::Open)
    }
}

// ----------------------------------------------------------------------------
// Link
// ----------------------------------------------------------------------------

/// Channel bundle handed to the session task
pub struct Link {
    /// Outbound frames toward the endpoint
    pub frames_out: mpsc::Sender<ClientFrame>,
    /// Inbound frame payloads, still unparsed
    pub frames_in: mpsc::Receiver<String>,
    /// Lifecycle transitions
    pub state: watch::Receiver<LinkState>,
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Owns the WebSocket task for one conversation
pub struct ConnectionManager {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<LinkState>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Open a connection to `endpoint` for one conversation
    ///
    /// Fails with `CredentialMissing` when the provider has no token at open
    /// time; the spawned task re-checks the provider on every reconnect.
    pub fn open(
        endpoint: &str,
        conversation_id: ConversationId,
        credentials: Arc<dyn CredentialProvider>,
        reconnect: ReconnectConfig,
        channels: &ChannelConfig,
    ) -> Result<(Self, Link)> {
        let endpoint: Url = endpoint
            .parse()
            .map_err(chatwire_core::TransportError::InvalidEndpoint)?;

        if credentials.bearer_token().is_none() {
            return Err(ChatwireError::CredentialMissing);
        }
        // Validate the URL shape up front rather than inside the task
        conversation_url(&endpoint, conversation_id, "")?;

        let (frames_out_tx, frames_out_rx) = mpsc::channel(channels.outbound_buffer_size);
        let (frames_in_tx, frames_in_rx) = mpsc::channel(channels.frame_buffer_size);
        let (state_tx, state_rx) = watch::channel(LinkState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_link(
            endpoint,
            conversation_id,
            credentials,
            reconnect.backoff,
            frames_out_rx,
            frames_in_tx,
            state_tx,
            shutdown_rx,
        ));

        let manager = Self {
            shutdown: shutdown_tx,
            state: state_rx.clone(),
            task: Some(task),
        };
        let link = Link {
            frames_out: frames_out_tx,
            frames_in: frames_in_rx,
            state: state_rx,
        };
        Ok((manager, link))
    }

    /// Watch the link lifecycle
    pub fn state(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Close the connection; idempotent
    ///
    /// Cancels a pending reconnect sleep, sends a close frame when the
    /// socket is up, and waits for the task to release the transport.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

// ----------------------------------------------------------------------------
// Connection URL
// ----------------------------------------------------------------------------

/// Build `{endpoint}/ws/conversations/{id}?token={token}`
fn conversation_url(endpoint: &Url, conversation_id: ConversationId, token: &str) -> Result<Url> {
    let mut url = endpoint.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| ChatwireError::config_error("endpoint url cannot be a base"))?;
        segments.pop_if_empty();
        segments.push("ws");
        segments.push("conversations");
        segments.push(&conversation_id.to_string());
    }
    url.query_pairs_mut().clear().append_pair("token", token);
    Ok(url)
}

// ----------------------------------------------------------------------------
// Link Task
// ----------------------------------------------------------------------------

/// Why the inner frame loop ended
enum LoopExit {
    /// Shutdown requested or the session went away; do not reconnect
    CallerClosed,
    /// The socket died underneath us; reconnect
    LinkLost,
}

#[allow(clippy::too_many_arguments)]
async fn run_link(
    endpoint: Url,
    conversation_id: ConversationId,
    credentials: Arc<dyn CredentialProvider>,
    backoff: ExponentialBackoff,
    mut frames_out: mpsc::Receiver<ClientFrame>,
    frames_in: mpsc::Sender<String>,
    state: watch::Sender<LinkState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    'reconnect: loop {
        if *shutdown.borrow() {
            break;
        }

        // Re-read the token each attempt; it may have been refreshed or
        // revoked since the last connect
        let Some(token) = credentials.bearer_token() else {
            warn!(%conversation_id, "no credential available; giving up");
            let _ = state.send(LinkState::Failed {
                reason: "credential missing".into(),
            });
            return;
        };
        let url = match conversation_url(&endpoint, conversation_id, &token) {
            Ok(url) => url,
            Err(e) => {
                let _ = state.send(LinkState::Failed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let _ = state.send(if attempt == 0 {
            LinkState::Connecting
        } else {
            LinkState::Reconnecting { attempt }
        });

        let connected = tokio::select! {
            result = connect_async(url) => result,
            _ = shutdown.changed() => break 'reconnect,
        };

        match connected {
            Ok((socket, _response)) => {
                info!(%conversation_id, "conversation link open");
                attempt = 0;
                let _ = state.send(LinkState::Open);

                let (mut sink, mut stream) = socket.split();
                let exit = loop {
                    tokio::select! {
                        frame = frames_out.recv() => match frame {
                            Some(frame) => {
                                let text = match frame.encode() {
                                    Ok(text) => text,
                                    Err(e) => {
                                        warn!(error = %e, "dropping unencodable frame");
                                        continue;
                                    }
                                };
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    warn!(error = %e, "send failed; link lost");
                                    break LoopExit::LinkLost;
                                }
                            }
                            None => break LoopExit::CallerClosed,
                        },
                        message = stream.next() => match message {
                            Some(Ok(Message::Text(text))) => {
                                if frames_in.send(text).await.is_err() {
                                    break LoopExit::CallerClosed;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(%conversation_id, "endpoint closed the link");
                                break LoopExit::LinkLost;
                            }
                            // Pings are answered by tungstenite itself
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "receive failed; link lost");
                                break LoopExit::LinkLost;
                            }
                        },
                        _ = shutdown.changed() => {
                            let _ = sink.send(Message::Close(None)).await;
                            break LoopExit::CallerClosed;
                        }
                    }
                };

                if matches!(exit, LoopExit::CallerClosed) {
                    break 'reconnect;
                }
            }
            Err(e) => {
                warn!(%conversation_id, error = %e, "connect failed");
            }
        }

        attempt += 1;
        if !backoff.allows(attempt) {
            warn!(%conversation_id, attempts = attempt, "reconnect attempts exhausted");
            let _ = state.send(LinkState::Failed {
                reason: format!("reconnect attempts exhausted after {attempt} tries"),
            });
            return;
        }

        let delay = backoff.delay(attempt - 1);
        debug!(%conversation_id, attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break 'reconnect,
        }
    }

    let _ = state.send(LinkState::Closed);
    debug!(%conversation_id, "conversation link task stopped");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_url_carries_token() {
        let endpoint: Url = "ws://localhost:8000".parse().unwrap();
        let conversation_id = ConversationId::generate();
        let url = conversation_url(&endpoint, conversation_id, "jwt-token").unwrap();
        assert_eq!(
            url.as_str(),
            format!("ws://localhost:8000/ws/conversations/{conversation_id}?token=jwt-token")
        );
    }

    #[test]
    fn test_conversation_url_respects_base_path() {
        let endpoint: Url = "wss://chat.example.com/api".parse().unwrap();
        let conversation_id = ConversationId::generate();
        let url = conversation_url(&endpoint, conversation_id, "t").unwrap();
        assert_eq!(
            url.as_str(),
            format!("wss://chat.example.com/api/ws/conversations/{conversation_id}?token=t")
        );
    }

    #[tokio::test]
    async fn test_open_without_credential_fails() {
        struct NoToken;
        impl CredentialProvider for NoToken {
            fn bearer_token(&self) -> Option<String> {
                None
            }
        }

        let result = ConnectionManager::open(
            "ws://localhost:9",
            ConversationId::generate(),
            Arc::new(NoToken),
            ReconnectConfig::default(),
            &ChannelConfig::default(),
        );
        assert!(matches!(result, Err(ChatwireError::CredentialMissing)));
    }
}
