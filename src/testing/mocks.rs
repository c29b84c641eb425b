//! Mock implementations for testing
//!
//! Provides an in-memory [`MockConnector`] so session behaviour can be tested
//! without a feed server. Every link it opens is recorded, and tests drive
//! the server side by emitting events on the most recent link.

use crate::protocol::TYPE_WELCOME;
use crate::transport::{
    CloseInfo, Connector, EventSink, TransportError, TransportEvent, TransportLink,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

/// How the mock server reacts when a link is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehaviour {
    /// Record the link and wait for the test to drive it
    Manual,
    /// Open the link and acknowledge the handshake straight away
    Accept,
    /// Fail the connection attempt
    Refuse,
}

#[derive(Debug)]
struct LinkRecord {
    url: Url,
    sink: EventSink,
    frames: Vec<String>,
    native_pings: usize,
    closed: bool,
    closed_by_client: bool,
}

#[derive(Debug)]
struct MockState {
    behaviour: MockBehaviour,
    links: Vec<LinkRecord>,
}

/// In-memory connector. Clones share the same recorded state.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    native_ping: bool,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new(MockBehaviour::Manual)
    }
}

impl MockConnector {
    pub fn new(behaviour: MockBehaviour) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                behaviour,
                links: Vec::new(),
            })),
            native_ping: false,
        }
    }

    /// Connector whose links report native ping support
    pub fn with_native_ping(mut self) -> Self {
        self.native_ping = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_behaviour(&self, behaviour: MockBehaviour) {
        self.lock().behaviour = behaviour;
    }

    /// Number of links opened so far
    pub fn open_count(&self) -> usize {
        self.lock().links.len()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.lock().links.iter().map(|link| link.url.clone()).collect()
    }

    fn latest_sink(&self) -> Option<EventSink> {
        self.lock().links.last().map(|link| link.sink.clone())
    }

    /// Emit an event on the most recent link
    pub fn emit(&self, event: TransportEvent) {
        if let Some(sink) = self.latest_sink() {
            sink.emit(event);
        }
    }

    /// Emit a text frame on the most recent link
    pub fn emit_text(&self, text: &str) {
        self.emit(TransportEvent::Message(text.to_string()));
    }

    /// Emit a JSON frame on the most recent link
    pub fn emit_json(&self, value: Value) {
        self.emit(TransportEvent::Message(value.to_string()));
    }

    /// Report the most recent link as open, without the handshake
    pub fn open_latest(&self) {
        self.emit(TransportEvent::Opened);
    }

    /// Send the handshake acknowledgment on the most recent link
    pub fn welcome(&self) {
        self.emit_json(welcome_frame());
    }

    /// Open and acknowledge the most recent link
    pub fn accept(&self) {
        self.open_latest();
        self.welcome();
    }

    /// Server side drop of the most recent link
    pub fn drop_connection(&self, code: u16, reason: &str) {
        let sink = {
            let mut state = self.lock();
            state.links.last_mut().map(|link| {
                link.closed = true;
                link.sink.clone()
            })
        };
        if let Some(sink) = sink {
            sink.emit(TransportEvent::Closed(CloseInfo::new(code, reason)));
        }
    }

    /// Every frame the client sent, across all links, in order
    pub fn sent_frames(&self) -> Vec<String> {
        self.lock()
            .links
            .iter()
            .flat_map(|link| link.frames.iter().cloned())
            .collect()
    }

    /// Sent frames decoded as JSON
    pub fn sent_commands(&self) -> Vec<Value> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Sent commands with the given `type`
    pub fn sent_of_type(&self, kind: &str) -> Vec<Value> {
        self.sent_commands()
            .into_iter()
            .filter(|command| command["type"] == kind)
            .collect()
    }

    /// Frames sent on link `index` (0-based, in open order)
    pub fn frames_on(&self, index: usize) -> Vec<String> {
        self.lock()
            .links
            .get(index)
            .map(|link| link.frames.clone())
            .unwrap_or_default()
    }

    /// Native pings across all links
    pub fn native_pings(&self) -> usize {
        self.lock().links.iter().map(|link| link.native_pings).sum()
    }

    /// Whether the client closed link `index`
    pub fn closed_by_client(&self, index: usize) -> bool {
        self.lock()
            .links
            .get(index)
            .is_some_and(|link| link.closed_by_client)
    }
}

/// Handshake acknowledgment as the server sends it
pub fn welcome_frame() -> Value {
    json!({"type": TYPE_WELCOME, "message": "Welcome to FCS WebSocket"})
}

/// Subscription confirmation as the server sends it
pub fn joined_room_frame(symbol: &str, timeframe: &str) -> Value {
    json!({
        "type": "message",
        "short": "joined_room",
        "symbol": symbol,
        "timeframe": timeframe,
    })
}

impl Connector for MockConnector {
    fn supports_native_ping(&self) -> bool {
        self.native_ping
    }

    fn open(&self, url: &Url, sink: EventSink) -> Box<dyn TransportLink> {
        let (index, behaviour) = {
            let mut state = self.lock();
            state.links.push(LinkRecord {
                url: url.clone(),
                sink: sink.clone(),
                frames: Vec::new(),
                native_pings: 0,
                closed: false,
                closed_by_client: false,
            });
            (state.links.len() - 1, state.behaviour)
        };

        match behaviour {
            MockBehaviour::Manual => {}
            MockBehaviour::Accept => {
                sink.emit(TransportEvent::Opened);
                sink.emit(TransportEvent::Message(welcome_frame().to_string()));
            }
            MockBehaviour::Refuse => {
                if let Some(link) = self.lock().links.get_mut(index) {
                    link.closed = true;
                }
                sink.emit(TransportEvent::Error(TransportError::ConnectFailed(
                    "connection refused".to_string(),
                )));
                sink.emit(TransportEvent::Closed(CloseInfo::abnormal(
                    "connection refused",
                )));
            }
        }

        Box::new(MockLink {
            connector: self.clone(),
            index,
        })
    }
}

/// Client half of a mock link
#[derive(Debug)]
pub struct MockLink {
    connector: MockConnector,
    index: usize,
}

impl TransportLink for MockLink {
    fn send(&self, text: String) -> Result<(), TransportError> {
        let mut state = self.connector.lock();
        match state.links.get_mut(self.index) {
            Some(link) if !link.closed => {
                link.frames.push(text);
                Ok(())
            }
            _ => Err(TransportError::LinkClosed),
        }
    }

    fn ping(&self) -> Result<(), TransportError> {
        let mut state = self.connector.lock();
        match state.links.get_mut(self.index) {
            Some(link) if !link.closed => {
                link.native_pings += 1;
                Ok(())
            }
            _ => Err(TransportError::LinkClosed),
        }
    }

    fn close(&self) {
        let sink = {
            let mut state = self.connector.lock();
            match state.links.get_mut(self.index) {
                Some(link) if !link.closed => {
                    link.closed = true;
                    link.closed_by_client = true;
                    Some(link.sink.clone())
                }
                _ => None,
            }
        };
        if let Some(sink) = sink {
            sink.emit(TransportEvent::Closed(CloseInfo::normal("closed by client")));
        }
    }
}
