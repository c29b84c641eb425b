//! Thread-safe session metrics
//!
//! Each session owns one [`SessionMetrics`]. The event loop bumps atomic
//! counters as it works and the client facade reads a [`MetricsSnapshot`]
//! from any thread without going through the loop.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomic counters for one feed session
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connected: AtomicBool,
    connection_attempts: AtomicU64,
    handshakes: AtomicU64,
    connection_drops: AtomicU64,
    reconnects_scheduled: AtomicU64,
    suspends: AtomicU64,
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    messages_received: AtomicU64,
    malformed_messages: AtomicU64,
    heartbeats: AtomicU64,
    last_heartbeat: AtomicU64,
    connection_start_time: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_completed(&self) {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn connection_closed(&self, unplanned: bool) {
        if unplanned {
            self.connection_drops.fetch_add(1, Ordering::Relaxed);
        }
        self.connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn suspended(&self) {
        self.suspends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        self.last_heartbeat
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Seconds since the current connection was established, 0 when down
    fn connection_duration(&self, now: u64) -> u64 {
        if !self.connected.load(Ordering::Relaxed) {
            return 0;
        }
        match self.connection_start_time.load(Ordering::Relaxed) {
            0 => 0,
            start => now.saturating_sub(start),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        MetricsSnapshot {
            connected: self.connected.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            handshakes: self.handshakes.load(Ordering::Relaxed),
            connection_drops: self.connection_drops.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            suspends: self.suspends.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            last_heartbeat: self.last_heartbeat.load(Ordering::Relaxed),
            connection_duration_seconds: self.connection_duration(now),
            timestamp: now,
        }
    }
}

/// Point-in-time copy of the session counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub connected: bool,
    pub connection_attempts: u64,
    pub handshakes: u64,
    pub connection_drops: u64,
    pub reconnects_scheduled: u64,
    pub suspends: u64,
    pub frames_sent: u64,
    pub send_failures: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    pub heartbeats: u64,
    pub last_heartbeat: u64,
    pub connection_duration_seconds: u64,
    pub timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
