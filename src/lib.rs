//! FCS market data feed client
//!
//! A resilient client for a real-time market data WebSocket feed. It keeps a
//! set of symbol/timeframe subscriptions, replays them after every
//! handshake, reconnects with a bounded fixed-delay policy, keeps the link
//! alive with a heartbeat and can suspend itself while the host application
//! is in the background.
//!
//! # Overview
//!
//! - [`session`]: connection lifecycle, subscription registry and the
//!   [`FeedClient`] facade
//! - [`transport`]: transport abstraction and the WebSocket implementation
//! - [`protocol`]: wire messages
//! - [`config`]: TOML configuration
//! - [`observability`]: logging setup and session metrics
//!
//! # Quick Start
//!
//! ```rust
//! use fcs_feed::protocol::{ClientCommand, ServerMessage};
//! use fcs_feed::session::Subscription;
//!
//! let subscription = Subscription::for_join("BINANCE:BTCUSDT", "1m").unwrap();
//! assert_eq!(subscription.key().as_str(), "BINANCE:BTCUSDT_1m");
//!
//! let frame = subscription.join_command().to_text().unwrap();
//! assert!(frame.contains("join_symbol"));
//!
//! let inbound = ServerMessage::parse(r#"{"type":"welcome"}"#).unwrap();
//! assert_eq!(inbound, ServerMessage::Welcome);
//! # let _ = ClientCommand::RemoveAll;
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, FeedConfig, SessionSettings};
pub use error::{FeedError, FeedResult};
pub use observability::MetricsSnapshot;
pub use session::{
    ConnectionState, FeedClient, SessionEvent, SessionObserver, SessionStatus, Subscription,
};
pub use transport::{CloseInfo, Connector, TransportError};
