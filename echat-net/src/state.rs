//! Session state machine
//!
//! A session type declares its states as a closed enum implementing
//! [`State`]. The active state owns a message-id → handler table which it
//! installs on enter and removes on exit.

use std::collections::HashMap;
use std::fmt::Debug;

use bytes::Bytes;
use echat_protocol::Envelope;
use tracing::{debug, warn};

use crate::NetError;

/// Handler for one message id
pub type MessageHandler<H> = fn(&mut H, u32, Bytes) -> Result<(), NetError>;

/// A named session mode
///
/// Hooks receive the owning session so they can register handlers and send
/// messages through it.
pub trait State<H>: Copy + Eq + Debug + Send + 'static {
    fn name(self) -> &'static str;

    /// Resolve a state by name
    fn from_name(name: &str) -> Option<Self>;

    fn on_create(self, _host: &mut H) {}

    fn on_enter(self, _host: &mut H) {}

    /// Must remove every handler this state installed
    fn on_exit(self, _host: &mut H) {}

    fn on_destroy(self, _host: &mut H) {}
}

/// Current state plus the live handler table
pub struct StateMachine<H, K> {
    current: Option<K>,
    handlers: HashMap<u32, MessageHandler<H>>,
}

impl<H, K: Copy> StateMachine<H, K> {
    pub fn new() -> Self {
        Self {
            current: None,
            handlers: HashMap::new(),
        }
    }

    pub fn current(&self) -> Option<K> {
        self.current
    }

    pub fn has_handler(&self, message_id: u32) -> bool {
        self.handlers.contains_key(&message_id)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<H, K: Copy> Default for StateMachine<H, K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A session that owns a [`StateMachine`]
///
/// Everything except the two accessors is provided.
pub trait StateHost: Sized {
    type State: State<Self>;

    fn machine(&self) -> &StateMachine<Self, Self::State>;

    fn machine_mut(&mut self) -> &mut StateMachine<Self, Self::State>;

    fn current_state(&self) -> Option<Self::State> {
        self.machine().current
    }

    /// Switch to the state called `name`
    ///
    /// No-op if it is already current. An unknown name leaves the current
    /// state untouched.
    fn translate(&mut self, name: &str) -> Result<(), NetError> {
        if self.current_state().map(|s| s.name()) == Some(name) {
            return Ok(());
        }
        let next = Self::State::from_name(name)
            .ok_or_else(|| NetError::UnknownState(name.to_string()))?;
        self.translate_to(next);
        Ok(())
    }

    /// Switch to `next`
    ///
    /// Order: create next, swap, exit previous, enter next, destroy previous.
    /// The previous state's handlers stay installed until its exit hook runs.
    fn translate_to(&mut self, next: Self::State) {
        if self.current_state() == Some(next) {
            return;
        }

        next.on_create(self);
        let previous = self.machine_mut().current.replace(next);
        if let Some(previous) = previous {
            previous.on_exit(self);
        }
        next.on_enter(self);
        if let Some(previous) = previous {
            previous.on_destroy(self);
        }

        debug!(
            from = previous.map(|s| s.name()).unwrap_or("-"),
            to = next.name(),
            "state translated"
        );
    }

    /// Exit and destroy the current state, leaving none
    fn shutdown_states(&mut self) {
        if let Some(current) = self.machine_mut().current.take() {
            current.on_exit(self);
            current.on_destroy(self);
        }
    }

    fn add_handler(
        &mut self,
        message_id: u32,
        handler: MessageHandler<Self>,
    ) -> Result<(), NetError> {
        let handlers = &mut self.machine_mut().handlers;
        if handlers.contains_key(&message_id) {
            return Err(NetError::DuplicateHandler(message_id));
        }
        handlers.insert(message_id, handler);
        Ok(())
    }

    /// Returns whether a handler was removed
    fn del_handler(&mut self, message_id: u32) -> bool {
        self.machine_mut().handlers.remove(&message_id).is_some()
    }

    /// Route an envelope to its handler
    ///
    /// Returns false when no handler is live for the id. Handler errors are
    /// logged and swallowed.
    fn dispatch(&mut self, envelope: Envelope) -> bool {
        let Envelope {
            message_id,
            payload,
        } = envelope;

        let Some(handler) = self.machine().handlers.get(&message_id).copied() else {
            debug!(
                message_id,
                state = self.current_state().map(|s| s.name()).unwrap_or("-"),
                "no handler for message"
            );
            return false;
        };

        if let Err(e) = handler(self, message_id, payload) {
            warn!(message_id, error = %e, "message handler failed");
        }
        true
    }
}
