//! Periodic liveness signals on an established connection

use super::timer::{ScopedTimer, TimerFactory, TimerFired, TimerKind};
use crate::protocol::ClientCommand;
use crate::transport::{TransportError, TransportLink};
use std::time::Duration;
use tracing::debug;

/// Owns the heartbeat timer. Never decides to disconnect.
#[derive(Debug)]
pub struct HeartbeatController {
    interval: Duration,
    timer: Option<ScopedTimer>,
}

impl HeartbeatController {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: None,
        }
    }

    /// Start ticking. A running timer is replaced, never duplicated.
    pub fn start(&mut self, timers: &TimerFactory) {
        self.stop();
        self.timer = Some(timers.every(TimerKind::Heartbeat, self.interval));
        debug!(target: "feed_session", interval_secs = self.interval.as_secs(), "Heartbeat started");
    }

    pub fn stop(&mut self) {
        if self.timer.take().is_some() {
            debug!(target: "feed_session", "Heartbeat stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Whether `fired` is a tick of the current timer
    pub fn accepts(&self, fired: TimerFired) -> bool {
        self.timer.as_ref().is_some_and(|timer| timer.matches(fired))
    }

    /// One beat: native ping where the transport has one, then the
    /// application-level ping. Fails only if the application ping could not be queued.
    pub fn beat(&self, link: &dyn TransportLink, native_ping: bool) -> Result<(), TransportError> {
        if native_ping {
            if let Err(e) = link.ping() {
                debug!(target: "feed_session", error = %e, "Native ping failed");
            }
        }

        let text = ClientCommand::ping_now()
            .to_text()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        link.send(text)
    }
}
