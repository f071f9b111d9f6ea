//! Per-conversation session task
//!
//! One [`ConversationSession`] task owns every piece of mutable state for a
//! conversation view: the delivery tracker, history, typing, read, and
//! presence sets. All mutation happens on the task's single `select!`
//! sequence; timers are folded into one tick interval polled on that same
//! sequence, and backend pagination runs on a spawned fetch whose result
//! re-enters through an internal channel. The [`ConversationClient`] handle
//! talks to the task through commands and receives [`AppEvent`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use chatwire_core::config::ChatwireConfig;
use chatwire_core::delivery::{AckDisposition, DeliveryAction, DeliveryTracker};
use chatwire_core::frame::{AckStatus, ClientFrame, SendMessageFrame, ServerFrame};
use chatwire_core::history::{
    ConversationHistory, EntryStatus, HistoryEntry, InsertOutcome, OptimisticEntry, Page,
};
use chatwire_core::message::{ChatMessage, MessageKind};
use chatwire_core::presence::PresenceSet;
use chatwire_core::receipts::ReadReceipts;
use chatwire_core::types::{
    ConversationId, IdempotencyKey, MessageId, SystemTimeSource, TimeSource, UserId,
};
use chatwire_core::typing::{TypingSignal, TypingTracker};
use chatwire_core::{ChatwireError, Result};

use crate::api::ChatBackend;
use crate::connection::{ConnectionManager, Link, LinkState};
use crate::router::{EventRouter, FrameHandler, InboundKind};

// ----------------------------------------------------------------------------
// App Events
// ----------------------------------------------------------------------------

/// State changes surfaced to the UI layer
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The link came up (initially or after a reconnect)
    LinkUp,
    /// The link dropped; `reconnecting` is false on caller-initiated close
    LinkDown { reconnecting: bool },
    /// The link gave up permanently
    LinkFailed { reason: String },
    /// An optimistic entry was appended for a local send
    MessageQueued { local_id: MessageId },
    /// A local send was confirmed by the endpoint
    MessageConfirmed {
        local_id: MessageId,
        message_id: MessageId,
    },
    /// A message from another participant arrived
    MessageArrived { message: ChatMessage },
    /// A local send failed; its entry stays visible as failed
    MessageFailed { local_id: MessageId, reason: String },
    /// The set of remote typists changed
    TypingChanged { users: Vec<UserId> },
    /// A message's reader set grew
    ReadersChanged {
        message_id: MessageId,
        readers: Vec<UserId>,
    },
    /// The online participant set changed
    PresenceChanged { online: Vec<UserId> },
    /// A page of older history was merged
    OlderLoaded { appended: usize, has_more: bool },
}

/// Result of a pagination request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub appended: usize,
    pub has_more: bool,
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests from the client handle to the session task
pub enum Command {
    Send {
        content: String,
        message_type: MessageKind,
        reply_to: Option<MessageId>,
        message_metadata: Option<serde_json::Value>,
        reply: oneshot::Sender<Result<MessageId>>,
    },
    InputActivity,
    InputCleared,
    MessageViewed {
        message: MessageId,
        visible_fraction: f32,
    },
    LoadOlder {
        limit: usize,
        reply: oneshot::Sender<Result<PageStats>>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<HistoryEntry>>,
    },
    OnFrame {
        kind: InboundKind,
        handler: FrameHandler,
    },
    OffFrame {
        kind: InboundKind,
    },
    Close,
}

/// Completions re-entering the session from spawned work
enum Internal {
    OlderPage {
        result: Result<Page>,
        reply: oneshot::Sender<Result<PageStats>>,
    },
}

// ----------------------------------------------------------------------------
// Conversation Session
// ----------------------------------------------------------------------------

/// The actor that owns all conversation state
pub struct ConversationSession {
    conversation_id: ConversationId,
    local_user: UserId,
    config: ChatwireConfig,

    delivery: DeliveryTracker<SystemTimeSource>,
    history: ConversationHistory<SystemTimeSource>,
    typing: TypingTracker<SystemTimeSource>,
    receipts: ReadReceipts,
    presence: PresenceSet,
    router: EventRouter,
    /// Pending send completions keyed by local message id
    waiters: HashMap<MessageId, oneshot::Sender<Result<MessageId>>>,

    backend: Arc<dyn ChatBackend>,
    frames_out: mpsc::Sender<ClientFrame>,
    frames_in: mpsc::Receiver<String>,
    link_state: watch::Receiver<LinkState>,
    /// Set once the connection task is gone for good
    link_gone: bool,

    commands: mpsc::Receiver<Command>,
    internal_tx: mpsc::Sender<Internal>,
    internal_rx: mpsc::Receiver<Internal>,
    app_events: mpsc::Sender<AppEvent>,
}

impl ConversationSession {
    /// Spawn a session over an already-opened link
    pub fn spawn(
        conversation_id: ConversationId,
        local_user: UserId,
        link: Link,
        backend: Arc<dyn ChatBackend>,
        config: ChatwireConfig,
    ) -> Result<ConversationClient> {
        config.validate().map_err(ChatwireError::config_error)?;

        let (command_tx, command_rx) = mpsc::channel(config.channels.command_buffer_size);
        let (app_tx, app_rx) = mpsc::channel(config.channels.app_event_buffer_size);
        let (internal_tx, internal_rx) = mpsc::channel(16);

        let time_source = SystemTimeSource::new();
        let session = Self {
            conversation_id,
            local_user,
            delivery: DeliveryTracker::new(config.delivery.clone(), time_source),
            history: ConversationHistory::new(
                conversation_id,
                local_user,
                config.reconcile.echo_window,
                time_source,
            ),
            typing: TypingTracker::new(config.typing.clone(), time_source),
            receipts: ReadReceipts::new(config.receipts.clone()),
            presence: PresenceSet::new(),
            router: EventRouter::new(),
            waiters: HashMap::new(),
            backend,
            frames_out: link.frames_out,
            frames_in: link.frames_in,
            link_state: link.state,
            link_gone: false,
            commands: command_rx,
            internal_tx,
            internal_rx,
            app_events: app_tx,
            config,
        };

        let task = tokio::spawn(session.run());
        Ok(ConversationClient {
            commands: command_tx,
            app_events: Some(app_rx),
            task,
        })
    }

    async fn run(mut self) {
        info!(conversation = %self.conversation_id, "conversation session starting");

        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => break,
                    Some(command) => self.handle_command(command),
                },
                text = self.frames_in.recv(), if !self.link_gone => match text {
                    Some(text) => self.handle_frame_text(&text),
                    None => self.link_gone = true,
                },
                changed = self.link_state.changed(), if !self.link_gone => match changed {
                    Ok(()) => self.handle_link_change(),
                    Err(_) => self.link_gone = true,
                },
                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal),
                _ = tick.tick() => self.handle_tick(),
            }
        }

        self.teardown();
    }

    // ------------------------------------------------------------------
    // Command handling
    // ------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send {
                content,
                message_type,
                reply_to,
                message_metadata,
                reply,
            } => self.handle_send(content, message_type, reply_to, message_metadata, reply),
            Command::InputActivity => {
                if let Some(signal) = self.typing.keystroke() {
                    self.transmit_typing(signal);
                }
            }
            Command::InputCleared => {
                if let Some(signal) = self.typing.input_cleared() {
                    self.transmit_typing(signal);
                }
            }
            Command::MessageViewed {
                message,
                visible_fraction,
            } => {
                if self.receipts.should_send(message, visible_fraction) {
                    self.transmit(ClientFrame::ReadReceipt {
                        message_id: message,
                    });
                }
            }
            Command::LoadOlder { limit, reply } => self.handle_load_older(limit, reply),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.history.entries().to_vec());
            }
            Command::OnFrame { kind, handler } => self.router.on(kind, handler),
            Command::OffFrame { kind } => self.router.off(kind),
            Command::Close => unreachable!("close handled by the run loop"),
        }
    }

    fn handle_send(
        &mut self,
        content: String,
        message_type: MessageKind,
        reply_to: Option<MessageId>,
        message_metadata: Option<serde_json::Value>,
        reply: oneshot::Sender<Result<MessageId>>,
    ) {
        let frame = SendMessageFrame {
            message_id: MessageId::generate(),
            idempotency_key: IdempotencyKey::generate(),
            content: content.clone(),
            conversation_id: self.conversation_id,
            message_type,
            reply_to,
            message_metadata: message_metadata.clone(),
        };
        let local_id = self.delivery.register(frame.clone());
        self.waiters.insert(local_id, reply);

        self.history.push_optimistic(OptimisticEntry {
            local_id,
            idempotency_key: frame.idempotency_key,
            sender_id: self.local_user,
            content,
            message_type,
            reply_to,
            message_metadata,
            queued_at: SystemTimeSource.now(),
            status: EntryStatus::Sending,
        });
        self.emit(AppEvent::MessageQueued { local_id });

        // Transmit right away when the link is up; otherwise the record
        // stays queued until a tick finds the link open again
        self.pump_delivery();
    }

    fn handle_load_older(&mut self, limit: usize, reply: oneshot::Sender<Result<PageStats>>) {
        let backend = Arc::clone(&self.backend);
        let conversation_id = self.conversation_id;
        let before = self.history.older_cursor();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = backend.message_page(conversation_id, before, limit).await;
            let _ = internal.send(Internal::OlderPage { result, reply }).await;
        });
    }

    fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::OlderPage { result, reply } => match result {
                Ok(page) => {
                    let has_more = page.has_more;
                    let appended = self.history.merge_older(page);
                    self.emit(AppEvent::OlderLoaded { appended, has_more });
                    let _ = reply.send(Ok(PageStats { appended, has_more }));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
        }
    }

    // ------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------

    fn handle_frame_text(&mut self, text: &str) {
        let Some(frame) = self.router.parse(text) else {
            return;
        };

        // Acks feed the delivery tracker and are consumed here; they never
        // reach user-registered handlers
        if let ServerFrame::MessageAck {
            message_id,
            status,
            server_message_id,
            timestamp,
            error,
            ..
        } = &frame
        {
            self.handle_ack(
                *message_id,
                *status,
                *server_message_id,
                *timestamp,
                error.clone(),
            );
            return;
        }

        match &frame {
            ServerFrame::NewMessage { message, .. } => self.handle_new_message(message.clone()),
            ServerFrame::Typing {
                user_id, is_typing, ..
            } => {
                if *user_id != self.local_user && self.typing.observe(*user_id, *is_typing) {
                    self.emit_typing_changed();
                }
            }
            ServerFrame::Read {
                message_id,
                reader_id,
                ..
            } => {
                if self.receipts.record(*message_id, *reader_id) {
                    self.emit(AppEvent::ReadersChanged {
                        message_id: *message_id,
                        readers: self.receipts.readers_of(*message_id),
                    });
                }
            }
            ServerFrame::Presence {
                user_id, is_online, ..
            } => {
                if self.presence.observe(*user_id, *is_online) {
                    self.emit(AppEvent::PresenceChanged {
                        online: self.presence.online_users(),
                    });
                }
            }
            ServerFrame::MessageAck { .. } => unreachable!("acks are intercepted above"),
        }

        self.router.dispatch(&frame);
    }

    fn handle_ack(
        &mut self,
        message_id: MessageId,
        status: AckStatus,
        server_message_id: Option<MessageId>,
        timestamp: Option<chrono::DateTime<chrono::Utc>>,
        error: Option<String>,
    ) {
        let success = status == AckStatus::Success;
        match self
            .delivery
            .acknowledge(message_id, success, server_message_id, error)
        {
            AckDisposition::Confirmed {
                local_id,
                server_id,
            } => {
                self.history.resolve_local(local_id, server_id, timestamp);
                if let Some(waiter) = self.waiters.remove(&local_id) {
                    let _ = waiter.send(Ok(server_id));
                }
                self.emit(AppEvent::MessageConfirmed {
                    local_id,
                    message_id: server_id,
                });
            }
            AckDisposition::Rejected { local_id, reason } => {
                self.history.mark_failed(local_id);
                if let Some(waiter) = self.waiters.remove(&local_id) {
                    let _ = waiter.send(Err(ChatwireError::ServerRejected {
                        reason: reason.clone(),
                    }));
                }
                self.emit(AppEvent::MessageFailed { local_id, reason });
            }
            AckDisposition::Unknown => {
                debug!(%message_id, "ack for unknown delivery; ignoring");
            }
        }
    }

    fn handle_new_message(&mut self, message: ChatMessage) {
        let message_id = message.id;
        match self.history.insert_confirmed(message.clone()) {
            InsertOutcome::Replaced { local_id } => {
                // Echo of a local send; the waiter may still be pending if
                // the ack was lost
                if let Some(waiter) = self.waiters.remove(&local_id) {
                    let _ = waiter.send(Ok(message_id));
                }
                self.emit(AppEvent::MessageConfirmed {
                    local_id,
                    message_id,
                });
            }
            InsertOutcome::Inserted => {
                self.emit(AppEvent::MessageArrived { message });
            }
            InsertOutcome::Duplicate => {}
        }
    }

    // ------------------------------------------------------------------
    // Link state and timers
    // ------------------------------------------------------------------

    fn handle_link_change(&mut self) {
        let state = self.link_state.borrow().clone();
        match state {
            LinkState::Open => {
                self.emit(AppEvent::LinkUp);
                // Flush everything that queued while disconnected
                self.pump_delivery();
            }
            LinkState::Reconnecting { .. } | LinkState::Closed => {
                self.emit(AppEvent::LinkDown {
                    reconnecting: matches!(state, LinkState::Reconnecting { .. }),
                });
                self.forget_remote_signals();
            }
            LinkState::Failed { reason } => {
                warn!(conversation = %self.conversation_id, %reason, "link failed");
                self.emit(AppEvent::LinkFailed { reason });
                self.forget_remote_signals();
                self.link_gone = true;
            }
            LinkState::Connecting => {}
        }
    }

    /// Remote ephemeral state is delta-driven and goes stale on link loss
    fn forget_remote_signals(&mut self) {
        if self.typing.clear_remote() {
            self.emit_typing_changed();
        }
        if self.presence.clear() {
            self.emit(AppEvent::PresenceChanged {
                online: self.presence.online_users(),
            });
        }
    }

    fn handle_tick(&mut self) {
        self.pump_delivery();

        if let Some(signal) = self.typing.poll_outbound() {
            self.transmit_typing(signal);
        }
        if self.typing.poll_remote() {
            self.emit_typing_changed();
        }
    }

    fn pump_delivery(&mut self) {
        let link_open = self.link_state.borrow().is_open();
        for action in self.delivery.poll(link_open) {
            match action {
                DeliveryAction::Transmit(frame) => self.transmit(frame),
                DeliveryAction::GiveUp { local_id, attempts } => {
                    self.history.mark_failed(local_id);
                    if let Some(waiter) = self.waiters.remove(&local_id) {
                        let _ = waiter.send(Err(ChatwireError::DeliveryFailed { attempts }));
                    }
                    self.emit(AppEvent::MessageFailed {
                        local_id,
                        reason: format!("delivery failed after {attempts} attempts"),
                    });
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Outbound plumbing
    // ------------------------------------------------------------------

    fn transmit(&mut self, frame: ClientFrame) {
        // try_send keeps the actor non-blocking; a full buffer only delays
        // a send_message until its ack deadline retransmits it
        if let Err(e) = self.frames_out.try_send(frame) {
            warn!(error = %e, "outbound frame dropped");
        }
    }

    fn transmit_typing(&mut self, signal: TypingSignal) {
        self.transmit(ClientFrame::Typing {
            is_typing: signal == TypingSignal::Started,
        });
    }

    fn emit(&mut self, event: AppEvent) {
        if self.app_events.try_send(event).is_err() {
            debug!("app event dropped; receiver gone or lagging");
        }
    }

    fn emit_typing_changed(&mut self) {
        self.emit(AppEvent::TypingChanged {
            users: self.typing.active_typists(),
        });
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    fn teardown(&mut self) {
        self.delivery.cancel_all();
        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(ChatwireError::Cancelled));
        }
        info!(conversation = %self.conversation_id, "conversation session stopped");
    }
}

// ----------------------------------------------------------------------------
// Conversation Client
// ----------------------------------------------------------------------------

/// Handle for driving a conversation session
pub struct ConversationClient {
    commands: mpsc::Sender<Command>,
    app_events: Option<mpsc::Receiver<AppEvent>>,
    task: JoinHandle<()>,
}

impl ConversationClient {
    /// Take the app event receiver (once)
    pub fn take_app_events(&mut self) -> Option<mpsc::Receiver<AppEvent>> {
        self.app_events.take()
    }

    /// Raw command channel, for integrations that manage their own replies
    pub fn command_sender(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    /// Send a text message; resolves with the confirmed message id
    pub async fn send<S: Into<String>>(&self, content: S) -> Result<MessageId> {
        self.send_with(content, MessageKind::Text, None, None).await
    }

    /// Send a message with full control over kind, reply target, and
    /// metadata
    pub async fn send_with<S: Into<String>>(
        &self,
        content: S,
        message_type: MessageKind,
        reply_to: Option<MessageId>,
        message_metadata: Option<serde_json::Value>,
    ) -> Result<MessageId> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Send {
            content: content.into(),
            message_type,
            reply_to,
            message_metadata,
            reply,
        })
        .await?;
        response.await.map_err(|_| ChatwireError::Cancelled)?
    }

    /// Report a keystroke in the message input
    pub async fn input_activity(&self) -> Result<()> {
        self.command(Command::InputActivity).await
    }

    /// Report that the message input was cleared
    pub async fn input_cleared(&self) -> Result<()> {
        self.command(Command::InputCleared).await
    }

    /// Report how much of a message is visible in the viewport
    pub async fn message_viewed(&self, message: MessageId, visible_fraction: f32) -> Result<()> {
        self.command(Command::MessageViewed {
            message,
            visible_fraction,
        })
        .await
    }

    /// Fetch and merge the next page of older history
    pub async fn load_older(&self, limit: usize) -> Result<PageStats> {
        let (reply, response) = oneshot::channel();
        self.command(Command::LoadOlder { limit, reply }).await?;
        response.await.map_err(|_| ChatwireError::Cancelled)?
    }

    /// Snapshot of current history, newest first
    pub async fn snapshot(&self) -> Result<Vec<HistoryEntry>> {
        let (reply, response) = oneshot::channel();
        self.command(Command::Snapshot { reply }).await?;
        response.await.map_err(|_| ChatwireError::Cancelled)
    }

    /// Register a frame handler; at most one per kind, last wins.
    /// Acknowledgment frames are consumed internally and never dispatched.
    pub async fn on_frame(&self, kind: InboundKind, handler: FrameHandler) -> Result<()> {
        self.command(Command::OnFrame { kind, handler }).await
    }

    /// Remove the frame handler for one kind
    pub async fn off_frame(&self, kind: InboundKind) -> Result<()> {
        self.command(Command::OffFrame { kind }).await
    }

    /// Stop the session; pending sends are rejected with `Cancelled`
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close).await;
        let _ = (&mut self.task).await;
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ChatwireError::Cancelled)
    }
}

// Dropping the client drops the command sender, which ends the session loop
// and runs its teardown; no explicit Drop is needed.

// ----------------------------------------------------------------------------
// Conversation (connection + session)
// ----------------------------------------------------------------------------

/// A fully wired conversation: connection manager plus session
pub struct Conversation {
    pub client: ConversationClient,
    connection: ConnectionManager,
}

impl Conversation {
    /// Open the link and spawn the session for one conversation view
    pub fn open(
        endpoint: &str,
        conversation_id: ConversationId,
        local_user: UserId,
        credentials: Arc<dyn crate::api::CredentialProvider>,
        backend: Arc<dyn ChatBackend>,
        config: ChatwireConfig,
    ) -> Result<Self> {
        let (connection, link) = ConnectionManager::open(
            endpoint,
            conversation_id,
            credentials,
            config.reconnect.clone(),
            &config.channels,
        )?;
        let client =
            ConversationSession::spawn(conversation_id, local_user, link, backend, config)?;
        Ok(Self { client, connection })
    }

    /// Watch the link lifecycle
    pub fn link_state(&self) -> watch::Receiver<LinkState> {
        self.connection.state()
    }

    /// Close the link and the session
    pub async fn close(mut self) {
        self.connection.close().await;
        self.client.close().await;
    }
}
