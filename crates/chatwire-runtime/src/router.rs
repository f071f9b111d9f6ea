//! Inbound frame routing
//!
//! Parses raw frame payloads into [`ServerFrame`]s and dispatches them to
//! registered handlers by kind. At most one handler per kind; registering
//! again replaces the previous handler. Malformed or unknown frames are
//! dropped with a warning and never reach the session loop.
//!
//! Acknowledgment frames are consumed by the session's delivery tracker
//! before dispatch, so handlers registered for them never fire.

use std::collections::HashMap;

use tracing::warn;

use chatwire_core::frame::ServerFrame;

// ----------------------------------------------------------------------------
// Inbound Kind
// ----------------------------------------------------------------------------

/// Discriminant of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    MessageAck,
    NewMessage,
    Typing,
    Read,
    Presence,
}

impl From<&ServerFrame> for InboundKind {
    fn from(frame: &ServerFrame) -> Self {
        match frame {
            ServerFrame::MessageAck { .. } => InboundKind::MessageAck,
            ServerFrame::NewMessage { .. } => InboundKind::NewMessage,
            ServerFrame::Typing { .. } => InboundKind::Typing,
            ServerFrame::Read { .. } => InboundKind::Read,
            ServerFrame::Presence { .. } => InboundKind::Presence,
        }
    }
}

// ----------------------------------------------------------------------------
// Event Router
// ----------------------------------------------------------------------------

/// Handler invoked for inbound frames of one kind
pub type FrameHandler = Box<dyn FnMut(&ServerFrame) + Send>;

/// Dispatches parsed inbound frames to registered handlers
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<InboundKind, FrameHandler>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one frame kind; last registration wins
    pub fn on(&mut self, kind: InboundKind, handler: FrameHandler) {
        self.handlers.insert(kind, handler);
    }

    /// Remove the handler for one frame kind
    pub fn off(&mut self, kind: InboundKind) {
        self.handlers.remove(&kind);
    }

    /// Parse a raw payload; malformed and unknown frames become `None`
    pub fn parse(&self, text: &str) -> Option<ServerFrame> {
        match ServerFrame::decode(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(error = %e, payload = text, "dropping unparseable frame");
                None
            }
        }
    }

    /// Invoke the handler registered for this frame's kind, if any
    pub fn dispatch(&mut self, frame: &ServerFrame) -> bool {
        match self.handlers.get_mut(&InboundKind::from(frame)) {
            Some(handler) => {
                handler(frame);
                true
            }
            None => false,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_core::types::UserId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn typing_frame() -> ServerFrame {
        ServerFrame::Typing {
            user_id: UserId::generate(),
            is_typing: true,
            conversation_id: None,
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let mut router = EventRouter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        router.on(
            InboundKind::Typing,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let counter = second.clone();
        router.on(
            InboundKind::Typing,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(router.dispatch(&typing_frame()));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_handler() {
        let mut router = EventRouter::new();
        router.on(InboundKind::Typing, Box::new(|_| {}));
        router.off(InboundKind::Typing);
        assert!(!router.dispatch(&typing_frame()));
    }

    #[test]
    fn test_parse_drops_garbage() {
        let router = EventRouter::new();
        assert!(router.parse("{{{").is_none());
        assert!(router.parse(r#"{"type":"no_such_frame"}"#).is_none());
        assert!(router
            .parse(r#"{"type":"typing","user_id":"not-a-uuid","is_typing":true}"#)
            .is_none());
    }
}
