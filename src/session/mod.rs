//! Feed session: connection lifecycle, subscriptions and recovery
//!
//! A session is a single event loop that owns the connection
//! state machine ([`reconnect`]), the subscription set ([`registry`]), the
//! heartbeat ([`heartbeat`]) and background suspension ([`visibility`]).
//! Applications talk to it through [`FeedClient`] and listen through
//! [`SessionObserver`]s.

pub mod client;
pub mod heartbeat;
pub(crate) mod manager;
pub mod message_handler;
pub mod observer;
pub mod reconnect;
pub mod registry;
pub(crate) mod timer;
pub mod visibility;

pub use client::FeedClient;
pub use manager::SessionStatus;
pub use observer::{ChannelObserver, ObserverSet, SessionEvent, SessionObserver};
pub use reconnect::{ConnectionState, HaltReason, ReconnectPolicy, SessionPhase};
pub use registry::{Subscription, SubscriptionKey, SubscriptionRegistry};
