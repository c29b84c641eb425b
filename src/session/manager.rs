//! The session event loop
//!
//! [`ConnectionManager`] owns every piece of mutable session state and runs
//! on a single task. Facade commands, transport events and timer fires all
//! arrive as [`SessionInput`]s on one channel and are handled to completion
//! one at a time, so a close is always fully processed before the next
//! connection attempt starts.

use super::heartbeat::HeartbeatController;
use super::message_handler::{EventRoute, MessageHandler};
use super::observer::{ObserverSet, SessionObserver};
use super::reconnect::{
    decide_after_close, log_transition, CloseCause, CloseDecision, ConnectionState,
    LifecycleEvent, ReconnectPolicy, SessionPhase, StopReason,
};
use super::registry::{Subscription, SubscriptionRegistry};
use super::timer::{ScopedTimer, TimerFactory, TimerFired, TimerKind};
use super::visibility::VisibilityController;
use crate::config::SessionSettings;
use crate::error::{redact_credentials, FeedError, FeedResult};
use crate::observability::SessionMetrics;
use crate::protocol::ClientCommand;
use crate::transport::{Connector, EventSink, TransportEvent, TransportLink};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

/// Everything the event loop reacts to
pub enum SessionInput {
    Command(SessionCommand),
    /// Event from the link opened as `generation`
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Timer(TimerFired),
}

/// Requests from the client facade
pub enum SessionCommand {
    Connect {
        reply: oneshot::Sender<FeedResult<()>>,
    },
    Disconnect,
    Join(Subscription),
    Leave(Subscription),
    RemoveAll,
    /// Pre-serialized application payload
    Send(String),
    Backgrounded,
    Foregrounded,
    AddObserver(Arc<dyn SessionObserver>),
    Subscriptions(oneshot::Sender<Vec<Subscription>>),
    Shutdown,
}

/// Snapshot of the session published after every input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub phase: SessionPhase,
    pub reconnect_attempts: u32,
    pub reconnect_exhausted: bool,
    pub subscriptions: usize,
}

impl SessionStatus {
    pub(crate) fn initial() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            phase: SessionPhase::Idle,
            reconnect_attempts: 0,
            reconnect_exhausted: false,
            subscriptions: 0,
        }
    }
}

pub struct ConnectionManager {
    target: Result<Url, FeedError>,
    connector: Arc<dyn Connector>,
    inputs: mpsc::UnboundedSender<SessionInput>,
    timers: TimerFactory,
    phase: SessionPhase,
    policy: ReconnectPolicy,
    registry: SubscriptionRegistry,
    heartbeat: HeartbeatController,
    visibility: VisibilityController,
    link: Option<Box<dyn TransportLink>>,
    generation: u64,
    retry_timer: Option<ScopedTimer>,
    /// Set once a drop or resume happens, cleared by an explicit disconnect.
    /// Picks `on_reconnected` over `on_connected`.
    reconnecting: bool,
    waiters: Vec<oneshot::Sender<FeedResult<()>>>,
    observers: ObserverSet,
    status: watch::Sender<SessionStatus>,
    metrics: Arc<SessionMetrics>,
}

impl ConnectionManager {
    pub fn new(
        target: Result<Url, FeedError>,
        settings: &SessionSettings,
        connector: Arc<dyn Connector>,
        inputs: mpsc::UnboundedSender<SessionInput>,
        status: watch::Sender<SessionStatus>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        Self {
            target,
            connector,
            timers: TimerFactory::new(inputs.clone()),
            inputs,
            phase: SessionPhase::Idle,
            policy: ReconnectPolicy::new(settings.reconnect_limit, settings.reconnect_delay()),
            registry: SubscriptionRegistry::new(),
            heartbeat: HeartbeatController::new(settings.heartbeat_interval()),
            visibility: VisibilityController::new(settings.suspend_timeout()),
            link: None,
            generation: 0,
            retry_timer: None,
            reconnecting: false,
            waiters: Vec::new(),
            observers: ObserverSet::new(),
            status,
            metrics,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Process inputs until shutdown or until every sender is gone
    pub async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<SessionInput>) {
        let endpoint = match &self.target {
            Ok(url) => redact_credentials(url.as_str()),
            Err(_) => "<unconfigured>".to_string(),
        };
        let span = crate::session_span!(endpoint = %endpoint);

        async move {
            debug!(target: "feed_session", "Session event loop started");
            while let Some(input) = inputs.recv().await {
                if !self.handle_input(input) {
                    break;
                }
            }
            self.teardown();
            debug!(target: "feed_session", "Session event loop stopped");
        }
        .instrument(span)
        .await
    }

    /// Handle one input. Returns false when the loop should stop.
    pub fn handle_input(&mut self, input: SessionInput) -> bool {
        let keep_running = match input {
            SessionInput::Command(command) => self.handle_command(command),
            SessionInput::Transport { generation, event } => {
                if generation == self.generation && self.link.is_some() {
                    self.handle_transport(event);
                } else {
                    debug!(
                        target: "feed_session",
                        generation,
                        current = self.generation,
                        "Ignoring event from superseded link"
                    );
                }
                true
            }
            SessionInput::Timer(fired) => {
                self.handle_timer(fired);
                true
            }
        };
        self.publish_status();
        keep_running
    }

    fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Connect { reply } => self.handle_connect(reply),
            SessionCommand::Disconnect => self.handle_disconnect(),
            SessionCommand::Join(subscription) => self.handle_join(subscription),
            SessionCommand::Leave(subscription) => self.handle_leave(subscription),
            SessionCommand::RemoveAll => self.handle_remove_all(),
            SessionCommand::Send(text) => {
                if self.phase.is_connected() {
                    self.send_text(text);
                } else {
                    debug!(target: "feed_session", "Dropping payload, session not connected");
                }
            }
            SessionCommand::Backgrounded => self.handle_backgrounded(),
            SessionCommand::Foregrounded => self.handle_foregrounded(),
            SessionCommand::AddObserver(observer) => self.observers.add(observer),
            SessionCommand::Subscriptions(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
            SessionCommand::Shutdown => return false,
        }
        true
    }

    fn handle_connect(&mut self, reply: oneshot::Sender<FeedResult<()>>) {
        let url = match &self.target {
            Ok(url) => url.clone(),
            Err(e) => {
                error!(error = %e, "Cannot connect to feed");
                let _ = reply.send(Err(e.clone()));
                return;
            }
        };

        match self.phase {
            SessionPhase::Connected => {
                let _ = reply.send(Ok(()));
            }
            SessionPhase::Dialing | SessionPhase::AwaitingHandshake => {
                self.waiters.push(reply);
            }
            _ => {
                self.waiters.push(reply);
                self.policy.reset();
                self.retry_timer = None;
                self.open_link(&url);
            }
        }
    }

    fn handle_disconnect(&mut self) {
        self.visibility.cancel_timer();
        self.visibility.clear_deadline();
        self.retry_timer = None;
        self.reconnecting = false;
        self.policy.reset();

        if self.phase == SessionPhase::Closed && self.link.is_none() {
            debug!(target: "feed_session", "Already disconnected");
            return;
        }
        self.handle_close(CloseCause::Manual);
    }

    fn handle_join(&mut self, subscription: Subscription) {
        let key = subscription.key();
        if self.registry.insert(subscription.clone()) {
            info!(subscription = %key, "Subscription added");
        } else {
            debug!(target: "feed_session", subscription = %key, "Subscription refreshed");
        }
        if self.phase.is_connected() {
            self.send_command(&subscription.join_command());
        }
    }

    fn handle_leave(&mut self, subscription: Subscription) {
        if self.registry.remove(&subscription).is_some() {
            info!(subscription = %subscription.key(), "Subscription removed");
        }
        if self.phase.is_connected() {
            self.send_command(&subscription.leave_command());
        }
    }

    fn handle_remove_all(&mut self) {
        let removed = self.registry.clear();
        info!(removed, "All subscriptions removed");
        if self.phase.is_connected() {
            self.send_command(&ClientCommand::RemoveAll);
        }
    }

    fn handle_backgrounded(&mut self) {
        if self.phase == SessionPhase::Closed {
            debug!(target: "feed_session", "Backgrounded while disconnected, ignoring");
            return;
        }
        self.visibility.on_backgrounded(Instant::now(), &self.timers);
    }

    fn handle_foregrounded(&mut self) {
        self.visibility.on_foregrounded(Instant::now());

        match self.phase {
            SessionPhase::Closed => {
                debug!(target: "feed_session", "Foregrounded after disconnect, not resuming");
            }
            SessionPhase::Connected => {
                debug!(target: "feed_session", "Foregrounded, connection maintained");
            }
            phase if phase.is_in_flight() => {
                debug!(target: "feed_session", "Foregrounded, connection attempt already underway");
            }
            phase if phase.is_resumable() && !self.registry.is_empty() => self.resume(),
            _ => {
                debug!(target: "feed_session", "Foregrounded, nothing to resume");
            }
        }
    }

    fn resume(&mut self) {
        let Ok(url) = self.target.clone() else {
            return;
        };
        info!(
            subscriptions = self.registry.len(),
            "Application active again, reconnecting"
        );
        self.visibility.clear_deadline();
        self.policy.reset();
        self.retry_timer = None;
        if self.phase != SessionPhase::Idle {
            self.reconnecting = true;
        }
        self.open_link(&url);
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Heartbeat => {
                if !self.heartbeat.accepts(fired) || !self.phase.is_connected() {
                    return;
                }
                let Some(link) = self.link.as_deref() else {
                    return;
                };
                match self
                    .heartbeat
                    .beat(link, self.connector.supports_native_ping())
                {
                    Ok(()) => {
                        self.metrics.heartbeat();
                        self.metrics.frame_sent();
                    }
                    Err(e) => {
                        self.metrics.send_failed();
                        warn!(error = %e, "Failed to send heartbeat");
                    }
                }
            }
            TimerKind::Reconnect => {
                if !self
                    .retry_timer
                    .as_ref()
                    .is_some_and(|timer| timer.matches(fired))
                {
                    return;
                }
                self.retry_timer = None;
                if let (SessionPhase::RetryPending { attempt }, Ok(url)) =
                    (self.phase, self.target.clone())
                {
                    info!(attempt, limit = self.policy.limit(), "Reconnecting to feed");
                    self.open_link(&url);
                }
            }
            TimerKind::Visibility => {
                if !self.visibility.take_expired(fired) {
                    return;
                }
                if self.phase.is_connected() {
                    info!("Application inactive, suspending feed connection");
                    self.handle_close(CloseCause::ProactiveSuspend);
                } else {
                    debug!(target: "feed_session", "Suspend window ran out while not connected");
                }
            }
        }
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match MessageHandler::route(event) {
            EventRoute::Opened => {
                debug!(target: "feed_session", "Transport open, awaiting handshake");
                self.transition(LifecycleEvent::TransportOpened);
            }
            EventRoute::ProbeReceived => {
                self.metrics.message_received();
                self.send_command(&ClientCommand::pong_now());
            }
            EventRoute::HandshakeAcknowledged => {
                self.metrics.message_received();
                self.handle_handshake();
            }
            EventRoute::SubscriptionConfirmed {
                subscription,
                payload,
            } => {
                self.metrics.message_received();
                info!(
                    symbol = %subscription.symbol,
                    timeframe = %subscription.timeframe,
                    "Subscribed"
                );
                self.registry.record_confirmed(subscription);
                self.observers.message(&payload);
            }
            EventRoute::Payload(value) => {
                self.metrics.message_received();
                self.observers.message(&value);
            }
            EventRoute::Malformed(e) => {
                self.metrics.malformed_message();
                warn!(error = %e, "Ignoring malformed message from feed server");
            }
            EventRoute::Closed(info) => self.handle_close(CloseCause::Remote(info)),
            EventRoute::Error(e) => {
                warn!(error = %redact_credentials(&e.to_string()), "Feed transport error");
                self.observers.error(&e);
            }
        }
    }

    fn handle_handshake(&mut self) {
        if !self.transition(LifecycleEvent::HandshakeAcknowledged) {
            return;
        }

        self.policy.reset();
        self.visibility.clear_deadline();
        self.retry_timer = None;
        self.metrics.handshake_completed();

        let replay = self.registry.replay_commands();
        if !replay.is_empty() {
            info!(count = replay.len(), "Replaying subscriptions");
        }
        for command in &replay {
            self.send_command(command);
        }

        self.heartbeat.start(&self.timers);
        self.publish_status();

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        if self.reconnecting {
            self.observers.reconnected();
        } else {
            self.observers.connected();
        }
    }

    /// Tear down the current link (if any) and decide what happens next
    fn handle_close(&mut self, cause: CloseCause) {
        self.heartbeat.stop();

        if let Some(link) = self.link.take() {
            let info = cause.close_info();
            if cause.is_remote() {
                warn!(code = info.code, reason = %info.reason, "Feed connection closed");
            } else {
                link.close();
                info!(reason = %info.reason, "Feed connection closed by client");
            }
            self.metrics.connection_closed(cause.is_remote());
            self.observers.closed(&info);
        }

        let window_elapsed = self.visibility.window_elapsed(Instant::now());
        let decision = decide_after_close(&cause, window_elapsed, &mut self.policy);
        if !self.transition(LifecycleEvent::Closed(decision.clone())) {
            return;
        }

        match decision {
            CloseDecision::Stop(StopReason::Manual) => {
                self.fail_waiters(FeedError::ConnectAbandoned);
            }
            CloseDecision::Stop(StopReason::ProactiveSuspend) => {
                self.metrics.suspended();
                self.fail_waiters(FeedError::ConnectAbandoned);
            }
            CloseDecision::Stop(StopReason::SuspendWindowElapsed) => {
                info!("Connection lost after inactivity window, not reconnecting");
                self.visibility.clear_deadline();
                self.fail_waiters(FeedError::ConnectAbandoned);
            }
            CloseDecision::Retry { attempt, delay } => {
                self.reconnecting = true;
                self.metrics.reconnect_scheduled();
                info!(
                    attempt,
                    limit = self.policy.limit(),
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.retry_timer = Some(self.timers.once(TimerKind::Reconnect, delay));
            }
            CloseDecision::Exhausted { attempts } => {
                error!(
                    attempts,
                    "Maximum reconnect attempts reached, check the network or the credential"
                );
                self.fail_waiters(FeedError::ReconnectExhausted { attempts });
            }
        }
    }

    fn open_link(&mut self, url: &Url) {
        if !self.transition(LifecycleEvent::Dial) {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let inputs = self.inputs.clone();
        let sink = EventSink::new(move |event| {
            let _ = inputs.send(SessionInput::Transport { generation, event });
        });

        self.metrics.connection_attempt();
        debug!(target: "feed_session", generation, "Opening transport link");
        self.link = Some(self.connector.open(url, sink));
    }

    fn send_command(&self, command: &ClientCommand) -> bool {
        match command.to_text() {
            Ok(text) => self.send_text(text),
            Err(e) => {
                error!(command = command.kind(), error = %e, "Failed to encode command");
                false
            }
        }
    }

    fn send_text(&self, text: String) -> bool {
        let Some(link) = self.link.as_deref() else {
            return false;
        };
        match link.send(text) {
            Ok(()) => {
                self.metrics.frame_sent();
                true
            }
            Err(e) => {
                self.metrics.send_failed();
                warn!(error = %e, "Failed to send frame");
                false
            }
        }
    }

    fn fail_waiters(&mut self, error: FeedError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    fn transition(&mut self, event: LifecycleEvent) -> bool {
        match self.phase.next(&event) {
            Some(next) => {
                log_transition(&self.phase, &next);
                self.phase = next;
                self.publish_status();
                true
            }
            None => {
                debug!(
                    target: "feed_session",
                    phase = ?self.phase,
                    event = ?event,
                    "Ignoring lifecycle event"
                );
                false
            }
        }
    }

    fn publish_status(&self) {
        let status = SessionStatus {
            state: self.phase.connection_state(),
            phase: self.phase,
            reconnect_attempts: self.policy.attempts(),
            reconnect_exhausted: self.policy.is_exhausted(),
            subscriptions: self.registry.len(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn teardown(&mut self) {
        self.heartbeat.stop();
        self.visibility.cancel_timer();
        self.retry_timer = None;
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.fail_waiters(FeedError::SessionClosed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBehaviour, MockConnector};
    use crate::transport::CloseInfo;

    struct Harness {
        manager: ConnectionManager,
        inputs: mpsc::UnboundedReceiver<SessionInput>,
        connector: MockConnector,
        status: watch::Receiver<SessionStatus>,
    }

    impl Harness {
        fn new(target: Result<Url, FeedError>) -> Self {
            let connector = MockConnector::new(MockBehaviour::Manual);
            let (tx, rx) = mpsc::unbounded_channel();
            let (status_tx, status_rx) = watch::channel(SessionStatus::initial());
            let manager = ConnectionManager::new(
                target,
                &SessionSettings::default(),
                Arc::new(connector.clone()),
                tx,
                status_tx,
                Arc::new(SessionMetrics::new()),
            );
            Self {
                manager,
                inputs: rx,
                connector,
                status: status_rx,
            }
        }

        fn connected() -> Self {
            let url = Url::parse("ws://localhost/ws?access_key=k").unwrap();
            Self::new(Ok(url))
        }

        fn command(&mut self, command: SessionCommand) {
            self.manager.handle_input(SessionInput::Command(command));
        }

        fn connect(&mut self) -> oneshot::Receiver<FeedResult<()>> {
            let (reply, rx) = oneshot::channel();
            self.command(SessionCommand::Connect { reply });
            rx
        }

        /// Feed queued inputs (transport events) through the manager
        fn pump(&mut self) {
            while let Ok(input) = self.inputs.try_recv() {
                self.manager.handle_input(input);
            }
        }
    }

    #[tokio::test]
    async fn test_missing_credential_rejects_connect() {
        let mut harness = Harness::new(Err(FeedError::MissingCredential));
        let mut reply = harness.connect();

        assert_eq!(reply.try_recv().unwrap(), Err(FeedError::MissingCredential));
        assert_eq!(harness.connector.open_count(), 0);
        assert_eq!(harness.manager.phase(), SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_open_without_welcome_is_still_connecting() {
        let mut harness = Harness::connected();
        harness.command(SessionCommand::Join(Subscription::new("BINANCE:BTCUSDT", "1m")));
        let mut reply = harness.connect();

        harness.connector.open_latest();
        harness.pump();

        assert_eq!(harness.manager.phase(), SessionPhase::AwaitingHandshake);
        assert_eq!(
            harness.status.borrow().state,
            ConnectionState::Connecting
        );
        assert!(reply.try_recv().is_err());
        // No replay before the handshake
        assert!(harness.connector.sent_frames().is_empty());

        harness.connector.welcome();
        harness.pump();
        assert_eq!(reply.try_recv().unwrap(), Ok(()));
        assert_eq!(harness.connector.sent_of_type("join_symbol").len(), 1);
        assert!(harness.status.borrow().state == ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_events_from_superseded_link_are_ignored() {
        let mut harness = Harness::connected();
        let _reply = harness.connect();
        harness.connector.accept();
        harness.pump();
        assert!(harness.manager.phase().is_connected());

        // A late close for an older generation must not touch the live link
        harness.manager.handle_input(SessionInput::Transport {
            generation: 0,
            event: TransportEvent::Closed(CloseInfo::abnormal("old")),
        });
        assert!(harness.manager.phase().is_connected());
    }

    #[tokio::test]
    async fn test_manual_disconnect_ignores_trailing_close() {
        let mut harness = Harness::connected();
        let _reply = harness.connect();
        harness.connector.accept();
        harness.pump();

        harness.command(SessionCommand::Disconnect);
        assert_eq!(harness.manager.phase(), SessionPhase::Closed);
        assert!(harness.connector.closed_by_client(0));

        // The mock reports the client close; it arrives after teardown
        harness.pump();
        assert_eq!(harness.manager.phase(), SessionPhase::Closed);
        assert_eq!(harness.status.borrow().reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn test_disconnect_abandons_pending_connect() {
        let mut harness = Harness::connected();
        let mut reply = harness.connect();

        harness.command(SessionCommand::Disconnect);
        assert_eq!(reply.try_recv().unwrap(), Err(FeedError::ConnectAbandoned));
    }

    #[tokio::test]
    async fn test_connect_while_in_flight_opens_one_link() {
        let mut harness = Harness::connected();
        let mut first = harness.connect();
        let mut second = harness.connect();
        assert_eq!(harness.connector.open_count(), 1);

        harness.connector.accept();
        harness.pump();
        assert_eq!(first.try_recv().unwrap(), Ok(()));
        assert_eq!(second.try_recv().unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_shutdown_fails_waiters() {
        let mut harness = Harness::connected();
        let mut reply = harness.connect();

        let keep_running = harness
            .manager
            .handle_input(SessionInput::Command(SessionCommand::Shutdown));
        assert!(!keep_running);
        harness.manager.teardown();
        assert_eq!(reply.try_recv().unwrap(), Err(FeedError::SessionClosed));
        assert!(harness.connector.closed_by_client(0));
    }
}
