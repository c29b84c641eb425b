//! Scoped timers that post back into the session event loop
//!
//! A timer is a spawned sleep that sends a [`TimerFired`] input when it
//! elapses. The [`ScopedTimer`] handle aborts the task when dropped, so the
//! component that owns the handle owns the timer's lifetime. Because abort
//! can race a fire that is already queued, every timer carries an id and
//! owners ignore fires that don't match the handle they currently hold.

use super::manager::SessionInput;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Which component a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Heartbeat,
    Reconnect,
    Visibility,
}

/// A timer elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub id: u64,
}

/// Handle to a pending timer. Dropping it cancels the timer.
#[derive(Debug)]
pub struct ScopedTimer {
    kind: TimerKind,
    id: u64,
    handle: JoinHandle<()>,
}

impl ScopedTimer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Whether `fired` came from this timer
    pub fn matches(&self, fired: TimerFired) -> bool {
        self.kind == fired.kind && self.id == fired.id
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns timers wired to a session's input channel
#[derive(Debug, Clone)]
pub struct TimerFactory {
    inputs: mpsc::UnboundedSender<SessionInput>,
    next_id: Arc<AtomicU64>,
}

impl TimerFactory {
    pub fn new(inputs: mpsc::UnboundedSender<SessionInput>) -> Self {
        Self {
            inputs,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Fire once after `delay`
    pub fn once(&self, kind: TimerKind, delay: Duration) -> ScopedTimer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inputs = self.inputs.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(SessionInput::Timer(TimerFired { kind, id }));
        });
        ScopedTimer { kind, id, handle }
    }

    /// Fire every `period`, first fire one period from now
    pub fn every(&self, kind: TimerKind, period: Duration) -> ScopedTimer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inputs = self.inputs.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                if inputs
                    .send(SessionInput::Timer(TimerFired { kind, id }))
                    .is_err()
                {
                    break;
                }
            }
        });
        ScopedTimer { kind, id, handle }
    }
}
