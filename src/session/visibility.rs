//! Foreground/background driven suspension of the feed
//!
//! When the application goes to the background a single suspend timer is
//! armed. If it runs out before the application comes back, the session
//! tears the connection down without scheduling a reconnect; coming back to
//! the foreground later resumes it. The backgrounded timestamp doubles as
//! the suspend window: a drop that happens after the window has run out is
//! not retried either.

use super::timer::{ScopedTimer, TimerFactory, TimerFired, TimerKind};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
pub struct VisibilityController {
    timeout: Duration,
    backgrounded_at: Option<Instant>,
    timer: Option<ScopedTimer>,
}

impl VisibilityController {
    /// A zero timeout disables suspension entirely
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            backgrounded_at: None,
            timer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// When the suspend window closes, if one is open
    pub fn suspend_deadline(&self) -> Option<Instant> {
        self.backgrounded_at.map(|at| at + self.timeout)
    }

    pub fn has_pending_timer(&self) -> bool {
        self.timer.is_some()
    }

    pub fn on_backgrounded(&mut self, now: Instant, timers: &TimerFactory) {
        self.cancel_timer();
        if !self.is_enabled() {
            debug!(target: "feed_session", "Application backgrounded, suspension disabled");
            return;
        }

        self.backgrounded_at = Some(now);
        self.timer = Some(timers.once(TimerKind::Visibility, self.timeout));
        info!(
            timeout_secs = self.timeout.as_secs(),
            "Application backgrounded, feed will be suspended if not foregrounded in time"
        );
    }

    /// Cancel the pending suspend and close the window if it is still open.
    /// Whether to resume is the caller's call.
    pub fn on_foregrounded(&mut self, now: Instant) {
        self.cancel_timer();
        if let Some(at) = self.backgrounded_at {
            if now.saturating_duration_since(at) < self.timeout {
                self.backgrounded_at = None;
            }
        }
    }

    /// Consume the suspend timer if `fired` is its fire
    pub fn take_expired(&mut self, fired: TimerFired) -> bool {
        if self.timer.as_ref().is_some_and(|timer| timer.matches(fired)) {
            self.timer = None;
            true
        } else {
            false
        }
    }

    /// Whether the background window is open and has run out
    pub fn window_elapsed(&self, now: Instant) -> bool {
        self.suspend_deadline().is_some_and(|deadline| now >= deadline)
    }

    pub fn clear_deadline(&mut self) {
        self.backgrounded_at = None;
    }

    pub fn cancel_timer(&mut self) {
        self.timer = None;
    }
}
