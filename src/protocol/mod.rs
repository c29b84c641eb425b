//! Wire message types for the market data feed
//!
//! This module implements the text-encoded JSON records exchanged with the
//! feed server: outbound client commands and the inbound message kinds the
//! session lifecycle inspects.

pub mod messages;

pub use messages::*;
