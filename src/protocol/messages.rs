//! Protocol message types for the market data feed
//!
//! Outbound commands are a closed set and serialize with a `type` tag.
//! Inbound traffic is open-ended: only the kinds that drive the session
//! lifecycle are recognised, everything else is carried as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Server liveness probe
pub const TYPE_PING: &str = "ping";
/// Handshake acknowledgment
pub const TYPE_WELCOME: &str = "welcome";
/// Generic server envelope, may carry a `short` discriminator
pub const TYPE_MESSAGE: &str = "message";
/// `short` value confirming a subscription
pub const SHORT_JOINED_ROOM: &str = "joined_room";

/// Commands sent from the client to the feed server
///
/// # Examples
/// ```
/// use fcs_feed::protocol::ClientCommand;
///
/// let join = ClientCommand::JoinSymbol {
///     symbol: "BINANCE:BTCUSDT".to_string(),
///     timeframe: "1m".to_string(),
/// };
/// let text = join.to_text().unwrap();
/// assert!(text.contains(r#""type":"join_symbol""#));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Subscribe to a symbol/timeframe feed
    JoinSymbol { symbol: String, timeframe: String },
    /// Unsubscribe from a symbol/timeframe feed
    LeaveSymbol { symbol: String, timeframe: String },
    /// Drop every subscription on the server side
    RemoveAll,
    /// Application-level heartbeat
    Ping { timestamp: i64 },
    /// Reply to a server liveness probe
    Pong { timestamp: i64 },
}

impl ClientCommand {
    /// Heartbeat stamped with the current time
    pub fn ping_now() -> Self {
        Self::Ping {
            timestamp: now_millis(),
        }
    }

    /// Probe reply stamped with the current time
    pub fn pong_now() -> Self {
        Self::Pong {
            timestamp: now_millis(),
        }
    }

    /// Serialize to the JSON text frame sent on the wire
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of this command
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinSymbol { .. } => "join_symbol",
            Self::LeaveSymbol { .. } => "leave_symbol",
            Self::RemoveAll => "remove_all",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
        }
    }
}

/// Unix epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Inbound message classified by what the session needs to do with it
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Server liveness probe, answered immediately with a pong
    Ping,
    /// Handshake acknowledgment: credential accepted, session established
    Welcome,
    /// Server confirmed a subscription
    JoinedRoom {
        symbol: String,
        timeframe: String,
        payload: Value,
    },
    /// Anything else, passed to the application untouched
    Other(Value),
}

/// Malformed inbound payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),
}

impl ServerMessage {
    /// Parse a text frame received from the server
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Ok(Self::classify(value))
    }

    /// Classify an already-decoded JSON value
    pub fn classify(value: Value) -> Self {
        match value.get("type").and_then(Value::as_str) {
            Some(TYPE_PING) => Self::Ping,
            Some(TYPE_WELCOME) => Self::Welcome,
            Some(TYPE_MESSAGE) => match joined_room_fields(&value) {
                Some((symbol, timeframe)) => Self::JoinedRoom {
                    symbol,
                    timeframe,
                    payload: value,
                },
                None => Self::Other(value),
            },
            _ => Self::Other(value),
        }
    }
}

fn joined_room_fields(value: &Value) -> Option<(String, String)> {
    if value.get("short").and_then(Value::as_str) != Some(SHORT_JOINED_ROOM) {
        return None;
    }
    let symbol = value.get("symbol").and_then(Value::as_str)?;
    let timeframe = value.get("timeframe").and_then(Value::as_str)?;
    if symbol.is_empty() || timeframe.is_empty() {
        return None;
    }
    Some((symbol.to_string(), timeframe.to_string()))
}
