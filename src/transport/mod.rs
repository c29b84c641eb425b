//! Transport layer for the feed session
//!
//! This module provides the transport abstraction the session drives and a
//! WebSocket implementation. A [`Connector`] opens links; each
//! [`TransportLink`] accepts outbound frames while its lifecycle events flow
//! back through the [`EventSink`] it was opened with.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub mod websocket;

pub use websocket::WebSocketConnector;

/// Close code for a normal, client-requested closure
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code used when the server sent no status
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code for a connection lost without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code and reason reported when a link goes away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal<S: Into<String>>(reason: S) -> Self {
        Self::new(CLOSE_NORMAL, reason)
    }

    pub fn abnormal<S: Into<String>>(reason: S) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {} (no reason)", self.code)
        } else {
            write!(f, "code {} ({})", self.code, self.reason)
        }
    }
}

/// Transport-level failures. Reported to observers, never fatal on their own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Transport link is closed")]
    LinkClosed,
}

/// Lifecycle events emitted by a link
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Raw transport is open. The server handshake has not happened yet.
    Opened,
    /// Text frame received
    Message(String),
    /// Link is gone. Emitted at most once per link.
    Closed(CloseInfo),
    /// Something went wrong. A `Closed` event normally follows.
    Error(TransportError),
}

/// Callback a link reports its events through
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(TransportEvent) + Send + Sync>);

impl EventSink {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Opens transport links
///
/// Selected once when the session is built. Implementations differ in whether
/// the underlying socket exposes its own keep-alive primitive.
pub trait Connector: Send + Sync {
    /// Whether links support a native ping distinct from the application heartbeat
    fn supports_native_ping(&self) -> bool {
        false
    }

    /// Start opening a link to `url`. Returns immediately; progress is reported
    /// through `sink`, starting with `Opened` or `Error` + `Closed`.
    fn open(&self, url: &Url, sink: EventSink) -> Box<dyn TransportLink>;
}

/// An open (or opening) transport link
pub trait TransportLink: Send {
    /// Queue a text frame
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Send a transport-native ping, when supported
    fn ping(&self) -> Result<(), TransportError>;

    /// Request closure. Idempotent.
    fn close(&self);
}
