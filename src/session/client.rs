//! Public client facade for a feed session
//!
//! [`FeedClient`] validates input on the caller's side and forwards commands
//! to the session event loop. It never touches session state directly; state
//! is read back through a watch channel the loop publishes to.

use super::manager::{ConnectionManager, SessionCommand, SessionInput, SessionStatus};
use super::observer::SessionObserver;
use super::reconnect::ConnectionState;
use super::registry::Subscription;
use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::observability::{MetricsSnapshot, SessionMetrics};
use crate::transport::{Connector, WebSocketConnector};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Handle to a running feed session
///
/// Construction spawns the session task, so it must happen inside a tokio
/// runtime. Dropping the client stops the session.
///
/// # Examples
/// ```no_run
/// use fcs_feed::{FeedClient, FeedConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FeedClient::new(FeedConfig::new("my-api-key"));
/// client.join("BINANCE:BTCUSDT", "1m")?;
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct FeedClient {
    inputs: mpsc::UnboundedSender<SessionInput>,
    status: watch::Receiver<SessionStatus>,
    metrics: Arc<SessionMetrics>,
    handle: Option<JoinHandle<()>>,
}

impl FeedClient {
    /// Client backed by a real WebSocket connection
    pub fn new(config: FeedConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector::new()))
    }

    /// Client backed by the given transport
    pub fn with_connector(config: FeedConfig, connector: Arc<dyn Connector>) -> Self {
        let target = config
            .validate()
            .map_err(FeedError::from)
            .and_then(|()| match config.credential() {
                Some(credential) => config.session_url(&credential).map_err(FeedError::from),
                None => Err(FeedError::MissingCredential),
            });
        if let Err(e) = &target {
            warn!(error = %e, "Feed client created without a usable configuration");
        }

        let (inputs, inputs_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus::initial());
        let metrics = Arc::new(SessionMetrics::new());

        let manager = ConnectionManager::new(
            target,
            &config.session,
            connector,
            inputs.clone(),
            status_tx,
            metrics.clone(),
        );
        let handle = tokio::spawn(manager.run(inputs_rx));

        Self {
            inputs,
            status,
            metrics,
            handle: Some(handle),
        }
    }

    fn dispatch(&self, command: SessionCommand) -> FeedResult<()> {
        self.inputs
            .send(SessionInput::Command(command))
            .map_err(|_| FeedError::SessionClosed)
    }

    /// Open the connection
    ///
    /// The request is queued immediately; the returned future settles once
    /// the server acknowledges the handshake, or fails if no credential is
    /// configured or the attempt is abandoned (disconnect, suspension or
    /// reconnect exhaustion).
    pub fn connect(&self) -> impl Future<Output = FeedResult<()>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        let dispatched = self.dispatch(SessionCommand::Connect { reply });

        async move {
            dispatched?;
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(FeedError::SessionClosed),
            }
        }
    }

    /// Close the connection without reconnecting. Idempotent.
    pub fn disconnect(&self) {
        if self.dispatch(SessionCommand::Disconnect).is_err() {
            warn!("Disconnect requested after session stopped");
        }
    }

    /// Subscribe to a symbol/timeframe feed. The symbol must be
    /// exchange-qualified, e.g. `BINANCE:BTCUSDT`.
    pub fn join(&self, symbol: &str, timeframe: &str) -> FeedResult<()> {
        let subscription = Subscription::for_join(symbol, timeframe).map_err(|e| {
            error!(error = %e, symbol, timeframe, "Rejected join");
            e
        })?;
        self.dispatch(SessionCommand::Join(subscription))
    }

    /// Unsubscribe. Leaving a feed that was never joined is not an error.
    pub fn leave(&self, symbol: &str, timeframe: &str) -> FeedResult<()> {
        let subscription = Subscription::for_leave(symbol, timeframe).map_err(|e| {
            error!(error = %e, symbol, timeframe, "Rejected leave");
            e
        })?;
        self.dispatch(SessionCommand::Leave(subscription))
    }

    /// Drop every subscription
    pub fn remove_all(&self) -> FeedResult<()> {
        self.dispatch(SessionCommand::RemoveAll)
    }

    /// Serialize and queue an arbitrary payload while connected. Returns
    /// false when the session is not connected or the payload cannot be
    /// serialized. A true result only means the payload was queued: if the
    /// connection drops before the session gets to it, the payload is dropped.
    pub fn send<T: Serialize>(&self, payload: &T) -> bool {
        if !self.is_connected() {
            return false;
        }
        match serde_json::to_string(payload) {
            Ok(text) => self.dispatch(SessionCommand::Send(text)).is_ok(),
            Err(e) => {
                warn!(error = %e, "Failed to serialize payload");
                false
            }
        }
    }

    /// The application moved to the background
    pub fn backgrounded(&self) {
        let _ = self.dispatch(SessionCommand::Backgrounded);
    }

    /// The application is in the foreground again
    pub fn foregrounded(&self) {
        let _ = self.dispatch(SessionCommand::Foregrounded);
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) -> FeedResult<()> {
        self.dispatch(SessionCommand::AddObserver(observer))
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that changes whenever the session status does
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Current subscriptions, sorted by key
    pub async fn subscriptions(&self) -> FeedResult<Vec<Subscription>> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(SessionCommand::Subscriptions(reply))?;
        rx.await.map_err(|_| FeedError::SessionClosed)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop the session and wait for it to finish
    pub async fn shutdown(mut self) {
        let _ = self.dispatch(SessionCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Session task ended abnormally");
            }
        }
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        let _ = self.inputs.send(SessionInput::Command(SessionCommand::Shutdown));
    }
}
