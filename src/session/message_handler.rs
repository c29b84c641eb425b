//! Pure routing of transport events for the session loop
//!
//! The event loop asks [`MessageHandler`] what an incoming transport event
//! means and then acts on the returned [`EventRoute`]. Parsing and
//! classification live here so they can be tested without a session.

use super::registry::Subscription;
use crate::protocol::{ProtocolError, ServerMessage};
use crate::transport::{CloseInfo, TransportError, TransportEvent};
use serde_json::Value;
use tracing::debug;

/// Pure routing decisions based on transport events
pub struct MessageHandler;

impl MessageHandler {
    /// Route a transport event to the action the session should take
    pub fn route(event: TransportEvent) -> EventRoute {
        match event {
            TransportEvent::Opened => EventRoute::Opened,
            TransportEvent::Message(text) => Self::route_text(&text),
            TransportEvent::Closed(info) => EventRoute::Closed(info),
            TransportEvent::Error(error) => EventRoute::Error(error),
        }
    }

    /// Route a text frame
    pub fn route_text(text: &str) -> EventRoute {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::Ping) => EventRoute::ProbeReceived,
            Ok(ServerMessage::Welcome) => EventRoute::HandshakeAcknowledged,
            Ok(ServerMessage::JoinedRoom {
                symbol,
                timeframe,
                payload,
            }) => EventRoute::SubscriptionConfirmed {
                subscription: Subscription::new(symbol, timeframe),
                payload,
            },
            Ok(ServerMessage::Other(value)) => EventRoute::Payload(value),
            Err(error) => {
                debug!(target: "feed_session", bytes = text.len(), "Dropping malformed frame");
                EventRoute::Malformed(error)
            }
        }
    }
}

/// What the session loop should do with a transport event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Raw transport open, handshake still pending
    Opened,
    /// Server probe, answer with a pong
    ProbeReceived,
    /// Server accepted the credential
    HandshakeAcknowledged,
    /// Server confirmed a subscription. The payload is still delivered.
    SubscriptionConfirmed {
        subscription: Subscription,
        payload: Value,
    },
    /// Application data
    Payload(Value),
    /// Unparseable frame, dropped
    Malformed(ProtocolError),
    /// Link closed
    Closed(CloseInfo),
    /// Link reported an error
    Error(TransportError),
}
