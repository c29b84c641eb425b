//! Pure connection lifecycle and reconnection decision logic
//!
//! This module contains the session's state machine and the reconnect
//! policy. Nothing here performs I/O: the event loop feeds it events and
//! acts on the decisions it returns.

use crate::transport::CloseInfo;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Externally visible connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Suspended,
}

/// Why automatic recovery stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HaltReason {
    /// The attempt limit was exceeded
    ReconnectExhausted,
    /// The connection dropped after the background window had already run out
    SuspendWindowElapsed,
}

/// Internal lifecycle phase. [`ConnectionState`] is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Never connected
    Idle,
    /// Transport opening
    Dialing,
    /// Transport open, waiting for the server's handshake acknowledgment
    AwaitingHandshake,
    /// Handshake acknowledged
    Connected,
    /// Dropped, retry scheduled
    RetryPending { attempt: u32 },
    /// Dropped, no automatic retry will happen
    Halted(HaltReason),
    /// Torn down while the application was in the background
    Suspended,
    /// Torn down by an explicit disconnect
    Closed,
}

impl SessionPhase {
    pub fn connection_state(&self) -> ConnectionState {
        match self {
            Self::Dialing | Self::AwaitingHandshake => ConnectionState::Connecting,
            Self::Connected => ConnectionState::Connected,
            Self::Suspended => ConnectionState::Suspended,
            Self::Idle | Self::RetryPending { .. } | Self::Halted(_) | Self::Closed => {
                ConnectionState::Disconnected
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// A transport link exists in this phase
    pub fn has_link(&self) -> bool {
        matches!(
            self,
            Self::Dialing | Self::AwaitingHandshake | Self::Connected
        )
    }

    /// A connect attempt is underway but not yet acknowledged
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Dialing | Self::AwaitingHandshake)
    }

    /// Foregrounding the application may bring the session back from here
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::RetryPending { .. } | Self::Halted(_) | Self::Suspended
        )
    }

    /// Guarded transition function. `None` means the event is not legal in
    /// this phase and must be ignored.
    pub fn next(&self, event: &LifecycleEvent) -> Option<SessionPhase> {
        use LifecycleEvent as E;
        use SessionPhase as P;

        match (self, event) {
            (P::Idle | P::RetryPending { .. } | P::Halted(_) | P::Suspended | P::Closed, E::Dial) => {
                Some(P::Dialing)
            }
            (P::Dialing, E::TransportOpened) => Some(P::AwaitingHandshake),
            // A repeated acknowledgment on a live session restarts it in place
            (P::Dialing | P::AwaitingHandshake | P::Connected, E::HandshakeAcknowledged) => {
                Some(P::Connected)
            }
            (_, E::Closed(CloseDecision::Stop(StopReason::Manual))) => Some(P::Closed),
            (P::Connected, E::Closed(CloseDecision::Stop(StopReason::ProactiveSuspend))) => {
                Some(P::Suspended)
            }
            (phase, E::Closed(decision)) if phase.has_link() => match decision {
                CloseDecision::Stop(StopReason::SuspendWindowElapsed) => {
                    Some(P::Halted(HaltReason::SuspendWindowElapsed))
                }
                CloseDecision::Retry { attempt, .. } => Some(P::RetryPending { attempt: *attempt }),
                CloseDecision::Exhausted { .. } => Some(P::Halted(HaltReason::ReconnectExhausted)),
                CloseDecision::Stop(_) => None,
            },
            _ => None,
        }
    }
}

/// Events that drive [`SessionPhase`] transitions
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A transport link is being opened
    Dial,
    /// Raw transport open
    TransportOpened,
    /// Server handshake acknowledged
    HandshakeAcknowledged,
    /// Link closed and the close was evaluated
    Closed(CloseDecision),
}

/// What ended a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// Peer or network closed it
    Remote(CloseInfo),
    /// Explicit `disconnect()`
    Manual,
    /// Background suspend timer
    ProactiveSuspend,
}

impl CloseCause {
    /// Close details reported to observers
    pub fn close_info(&self) -> CloseInfo {
        match self {
            Self::Remote(info) => info.clone(),
            Self::Manual => CloseInfo::normal("closed by client"),
            Self::ProactiveSuspend => CloseInfo::normal("suspended while inactive"),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Reasons a close does not lead to a reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Manual,
    ProactiveSuspend,
    SuspendWindowElapsed,
}

/// Outcome of evaluating a close
#[derive(Debug, Clone, PartialEq)]
pub enum CloseDecision {
    /// No reconnect
    Stop(StopReason),
    /// Reconnect after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Limit exceeded; automatic recovery is over
    Exhausted { attempts: u32 },
}

/// Bounded reconnect attempts with a constant delay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempts: u32,
    limit: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(limit: u32, delay: Duration) -> Self {
        Self {
            attempts: 0,
            limit,
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Exhausted once the attempt count has passed the limit
    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.limit
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Count an unplanned drop and decide whether another attempt is allowed
    pub fn record_drop(&mut self) -> CloseDecision {
        self.attempts = self.attempts.saturating_add(1);
        if self.is_exhausted() {
            CloseDecision::Exhausted {
                attempts: self.limit,
            }
        } else {
            CloseDecision::Retry {
                attempt: self.attempts,
                delay: self.delay,
            }
        }
    }
}

/// Evaluate a close in order: manual teardown, proactive suspend, elapsed
/// background window, then the reconnect policy.
pub fn decide_after_close(
    cause: &CloseCause,
    suspend_window_elapsed: bool,
    policy: &mut ReconnectPolicy,
) -> CloseDecision {
    match cause {
        CloseCause::Manual => CloseDecision::Stop(StopReason::Manual),
        CloseCause::ProactiveSuspend => CloseDecision::Stop(StopReason::ProactiveSuspend),
        CloseCause::Remote(_) if suspend_window_elapsed => {
            CloseDecision::Stop(StopReason::SuspendWindowElapsed)
        }
        CloseCause::Remote(_) => policy.record_drop(),
    }
}

/// Log a phase change at a level matching its significance
pub fn log_transition(from: &SessionPhase, to: &SessionPhase) {
    match (from, to) {
        (SessionPhase::AwaitingHandshake | SessionPhase::Dialing, SessionPhase::Connected) => {
            info!("Feed session established");
        }
        (SessionPhase::Connected, SessionPhase::RetryPending { attempt }) => {
            warn!(attempt, "Feed connection lost");
        }
        (_, SessionPhase::Halted(HaltReason::ReconnectExhausted)) => {
            error!("Feed connection permanently lost: reconnect attempts exhausted");
        }
        _ => {
            tracing::debug!(target: "feed_session", "Session phase: {:?} -> {:?}", from, to);
        }
    }
}
