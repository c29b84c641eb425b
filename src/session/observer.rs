//! Session event observers
//!
//! Applications implement [`SessionObserver`] to hear about lifecycle changes
//! and inbound data. Every method has an empty default, so an observer only
//! overrides what it cares about. Observers run on the session task and must
//! not block.

use crate::transport::{CloseInfo, TransportError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub trait SessionObserver: Send + Sync {
    /// First handshake of this client completed
    fn on_connected(&self) {}

    /// Handshake completed after a drop or a resume
    fn on_reconnected(&self) {}

    /// Link closed, for any reason
    fn on_closed(&self, _info: &CloseInfo) {}

    /// Inbound message other than a probe or handshake ack
    fn on_message(&self, _message: &Value) {}

    /// Transport reported an error
    fn on_error(&self, _error: &TransportError) {}
}

/// Observers in registration order
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn connected(&self) {
        self.observers.iter().for_each(|o| o.on_connected());
    }

    pub fn reconnected(&self) {
        self.observers.iter().for_each(|o| o.on_reconnected());
    }

    pub fn closed(&self, info: &CloseInfo) {
        self.observers.iter().for_each(|o| o.on_closed(info));
    }

    pub fn message(&self, message: &Value) {
        self.observers.iter().for_each(|o| o.on_message(message));
    }

    pub fn error(&self, error: &TransportError) {
        self.observers.iter().for_each(|o| o.on_error(error));
    }
}

/// Observer callbacks as values
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Reconnected,
    Closed(CloseInfo),
    Message(Value),
    Error(TransportError),
}

/// Observer that forwards every callback into a channel
///
/// Handy for applications that prefer a stream over callbacks, and for tests
/// that assert on event order.
pub struct ChannelObserver {
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.events.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_connected(&self) {
        self.forward(SessionEvent::Connected);
    }

    fn on_reconnected(&self) {
        self.forward(SessionEvent::Reconnected);
    }

    fn on_closed(&self, info: &CloseInfo) {
        self.forward(SessionEvent::Closed(info.clone()));
    }

    fn on_message(&self, message: &Value) {
        self.forward(SessionEvent::Message(message.clone()));
    }

    fn on_error(&self, error: &TransportError) {
        self.forward(SessionEvent::Error(error.clone()));
    }
}
