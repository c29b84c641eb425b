//! Subscription registry: the set of feeds the application wants
//!
//! The registry is the source of truth for replay. It outlives every
//! connection, so whatever is in it is re-sent after each handshake.

use crate::error::FeedError;
use crate::protocol::ClientCommand;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Separator between exchange qualifier and instrument, e.g. `BINANCE:BTCUSDT`
pub const EXCHANGE_SEPARATOR: char = ':';

/// Case-normalized identity of a subscription: `UPPER(symbol)_timeframe`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionKey(String);

impl SubscriptionKey {
    pub fn new(symbol: &str, timeframe: &str) -> Self {
        Self(format!("{}_{}", symbol.to_uppercase(), timeframe))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A symbol/timeframe feed. The symbol keeps the casing the caller used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub symbol: String,
    pub timeframe: String,
}

impl Subscription {
    pub fn new<S: Into<String>, T: Into<String>>(symbol: S, timeframe: T) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }

    /// Validate arguments for a join: both fields present and the symbol
    /// exchange-qualified.
    pub fn for_join(symbol: &str, timeframe: &str) -> Result<Self, FeedError> {
        let subscription = Self::for_leave(symbol, timeframe)?;
        if !symbol.contains(EXCHANGE_SEPARATOR) {
            return Err(FeedError::invalid_input(format!(
                "Symbol must include exchange prefix, e.g. \"BINANCE:BTCUSDT\" (got \"{symbol}\")"
            )));
        }
        Ok(subscription)
    }

    /// Validate arguments for a leave: both fields present
    pub fn for_leave(symbol: &str, timeframe: &str) -> Result<Self, FeedError> {
        if symbol.is_empty() || timeframe.is_empty() {
            return Err(FeedError::invalid_input(
                "Symbol and timeframe are required",
            ));
        }
        Ok(Self::new(symbol, timeframe))
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.symbol, &self.timeframe)
    }

    pub fn join_command(&self) -> ClientCommand {
        ClientCommand::JoinSymbol {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
        }
    }

    pub fn leave_command(&self) -> ClientCommand {
        ClientCommand::LeaveSymbol {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
        }
    }
}

/// Desired subscriptions keyed by normalized identity
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    entries: HashMap<SubscriptionKey, Subscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription, replacing any entry with the same key.
    /// Returns true if the key was not present before.
    pub fn insert(&mut self, subscription: Subscription) -> bool {
        self.entries
            .insert(subscription.key(), subscription)
            .is_none()
    }

    /// Record a server-confirmed subscription unless the key is already known.
    /// Returns true if it was added.
    pub fn record_confirmed(&mut self, subscription: Subscription) -> bool {
        let key = subscription.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, subscription);
        true
    }

    /// Remove by identity. Absent entries are not an error.
    pub fn remove(&mut self, subscription: &Subscription) -> Option<Subscription> {
        self.entries.remove(&subscription.key())
    }

    /// Drop everything, returning how many entries there were
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &SubscriptionKey) -> Option<&Subscription> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.values()
    }

    /// One join command per entry, in iteration order
    pub fn replay_commands(&self) -> Vec<ClientCommand> {
        self.iter().map(Subscription::join_command).collect()
    }

    /// Snapshot sorted by key, for stable presentation
    pub fn snapshot(&self) -> Vec<Subscription> {
        let mut keyed: Vec<_> = self.entries.iter().collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        keyed.into_iter().map(|(_, sub)| sub.clone()).collect()
    }
}
