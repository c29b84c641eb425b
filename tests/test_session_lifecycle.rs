//! Connection lifecycle behaviour of a feed session
//!
//! Covers the handshake contract, inbound message handling, manual
//! disconnect and session shutdown.


use fcs_feed::config::{FeedConfig, SessionSettings};
use fcs_feed::session::{ConnectionState, SessionEvent, SessionPhase};
use fcs_feed::testing::{MockBehaviour, MockConnector};
use fcs_feed::transport::{CloseInfo, TransportError, TransportEvent};
use fcs_feed::FeedError;
use serde_json::json;
use std::time::Duration;
use test_helpers::{advance, count_closed, settle, TestSession, TEST_ENDPOINT, TEST_KEY};

#[tokio::test(start_paused = true)]
async fn test_connect_without_credential_is_rejected() {
    // Arrange: no inline key and an environment variable nobody sets
    let mut config = FeedConfig::default();
    config.feed.api_key_env = "FCS_FEED_TEST_UNSET_CREDENTIAL".to_string();
    let session = TestSession::from_config(MockConnector::new(MockBehaviour::Accept), config);

    // Act
    let result = session.client.connect().await;

    // Assert: rejected immediately, nothing opened, never retried
    assert_eq!(result, Err(FeedError::MissingCredential));
    advance(Duration::from_secs(30)).await;
    assert_eq!(session.connector.open_count(), 0);
    assert_eq!(session.client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_endpoint_is_rejected() {
    let config = FeedConfig::new(TEST_KEY).with_endpoint("https://feed.test/ws");
    let session = TestSession::from_config(MockConnector::new(MockBehaviour::Accept), config);

    let result = session.client.connect().await;

    assert!(matches!(result, Err(FeedError::Config(_))));
    assert_eq!(session.connector.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_heartbeat_interval_is_rejected() {
    let config = FeedConfig::new(TEST_KEY)
        .with_endpoint(TEST_ENDPOINT)
        .with_session(SessionSettings {
            heartbeat_interval_secs: 0,
            ..SessionSettings::default()
        });
    let session = TestSession::from_config(MockConnector::new(MockBehaviour::Accept), config);

    let result = session.client.connect().await;

    match result {
        Err(FeedError::Config(message)) => assert!(message.contains("heartbeat_interval_secs")),
        other => panic!("Expected Config error, got {other:?}"),
    }
    assert_eq!(session.connector.open_count(), 0);
    assert_eq!(session.client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_settles_only_on_handshake() {
    // Arrange
    let mut session = TestSession::start(MockBehaviour::Manual);
    let pending = tokio::spawn(session.client.connect());
    settle().await;

    // Credential travels as a query parameter
    let urls = session.connector.urls();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].query(), Some("access_key=test-key"));
    assert_eq!(session.client.state(), ConnectionState::Connecting);

    // Act: raw open is not enough
    session.connector.open_latest();
    settle().await;
    assert!(!pending.is_finished());
    assert_eq!(session.client.status().phase, SessionPhase::AwaitingHandshake);
    assert_eq!(session.client.state(), ConnectionState::Connecting);

    // Act: handshake acknowledgment
    session.connector.welcome();
    settle().await;

    // Assert
    assert_eq!(pending.await.unwrap(), Ok(()));
    assert!(session.client.is_connected());
    assert_eq!(session.drain_events(), vec![SessionEvent::Connected]);
}

#[tokio::test(start_paused = true)]
async fn test_connect_when_connected_resolves_immediately() {
    let session = TestSession::connected().await;

    assert_eq!(session.client.connect().await, Ok(()));
    assert_eq!(session.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_probe_is_answered_with_pong() {
    let session = TestSession::connected().await;

    session.connector.emit_json(json!({"type": "ping", "timestamp": 1}));
    settle().await;

    let pongs = session.connector.sent_of_type("pong");
    assert_eq!(pongs.len(), 1);
    assert!(pongs[0]["timestamp"].as_i64().unwrap() > 1_600_000_000_000);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payload_is_ignored() {
    let mut session = TestSession::connected().await;
    session.drain_events();

    session.connector.emit_text("{not json");
    session
        .connector
        .emit_json(json!({"type": "price", "symbol": "BINANCE:BTCUSDT", "c": 64000.5}));
    settle().await;

    // Connection survives and the next valid payload still arrives
    assert!(session.client.is_connected());
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::Message(
            json!({"type": "price", "symbol": "BINANCE:BTCUSDT", "c": 64000.5})
        )]
    );
    let metrics = session.client.metrics();
    assert_eq!(metrics.malformed_messages, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_does_not_change_state() {
    let mut session = TestSession::connected().await;
    session.drain_events();

    session
        .connector
        .emit(TransportEvent::Error(TransportError::ReadFailed(
            "bad frame".to_string(),
        )));
    settle().await;

    assert!(session.client.is_connected());
    assert_eq!(
        session.drain_events(),
        vec![SessionEvent::Error(TransportError::ReadFailed(
            "bad frame".to_string()
        ))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_disconnect_schedules_no_reconnect() {
    // Arrange
    let mut session = TestSession::connected().await;
    session.drain_events();

    // Act
    session.client.disconnect();
    settle().await;

    // Assert: closed once by the client
    assert_eq!(session.client.state(), ConnectionState::Disconnected);
    assert_eq!(session.client.status().phase, SessionPhase::Closed);
    assert!(session.connector.closed_by_client(0));
    let events = session.drain_events();
    assert_eq!(events, vec![SessionEvent::Closed(CloseInfo::normal("closed by client"))]);

    // Assert: no reconnect, no matter how long we wait
    advance(Duration::from_secs(120)).await;
    assert_eq!(session.connector.open_count(), 1);
    assert_eq!(session.client.status().reconnect_attempts, 0);
    assert_eq!(session.client.metrics().reconnects_scheduled, 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_idempotent() {
    let mut session = TestSession::connected().await;
    session.drain_events();

    session.client.disconnect();
    session.client.disconnect();
    settle().await;

    assert_eq!(count_closed(&session.drain_events()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_abandons_pending_connect() {
    let session = TestSession::start(MockBehaviour::Manual);
    let pending = tokio::spawn(session.client.connect());
    settle().await;

    session.client.disconnect();
    settle().await;

    assert_eq!(pending.await.unwrap(), Err(FeedError::ConnectAbandoned));
    assert!(session.connector.closed_by_client(0));
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_disconnect_is_a_fresh_connection() {
    let mut session = TestSession::connected().await;
    session.client.disconnect();
    settle().await;
    session.drain_events();

    session.client.connect().await.unwrap();

    assert_eq!(session.connector.open_count(), 2);
    assert_eq!(session.drain_events(), vec![SessionEvent::Connected]);
}

#[tokio::test(start_paused = true)]
async fn test_send_only_when_connected() {
    let session = TestSession::start(MockBehaviour::Accept);

    assert!(!session.client.send(&json!({"type": "custom"})));

    session.client.connect().await.unwrap();
    assert!(session.client.send(&json!({"type": "custom", "value": 7})));
    settle().await;

    let custom = session.connector.sent_of_type("custom");
    assert_eq!(custom, vec![json!({"type": "custom", "value": 7})]);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_closes_link() {
    let session = TestSession::connected().await;
    let connector = session.connector.clone();

    drop(session);
    settle().await;

    assert!(connector.closed_by_client(0));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_fails_pending_connect() {
    let session = TestSession::start(MockBehaviour::Manual);
    let pending = tokio::spawn(session.client.connect());
    settle().await;

    session.client.shutdown().await;

    assert_eq!(pending.await.unwrap(), Err(FeedError::SessionClosed));
}

#[tokio::test(start_paused = true)]
async fn test_metrics_track_session() {
    let session = TestSession::connected().await;
    session.connector.emit_json(json!({"type": "price"}));
    settle().await;

    let metrics = session.client.metrics();
    assert!(metrics.connected);
    assert_eq!(metrics.connection_attempts, 1);
    assert_eq!(metrics.handshakes, 1);
    // welcome + price
    assert_eq!(metrics.messages_received, 2);
}
