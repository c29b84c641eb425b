//! Reconnection policy behaviour
//!
//! Unplanned drops are retried with a fixed delay up to the configured limit.
//! Past the limit the session halts until the application intervenes.


use fcs_feed::config::SessionSettings;
use fcs_feed::session::{ConnectionState, HaltReason, SessionEvent, SessionPhase};
use fcs_feed::testing::{MockBehaviour, MockConnector};
use fcs_feed::transport::CloseInfo;
use fcs_feed::FeedError;
use std::time::Duration;
use test_helpers::{advance, count_closed, settle, TestSession};

#[tokio::test(start_paused = true)]
async fn test_attempts_stop_after_limit() {
    // Arrange: server refuses every connection (limit 5, delay 3s)
    let mut session = TestSession::start(MockBehaviour::Refuse);

    // Act
    let pending = tokio::spawn(session.client.connect());
    advance(Duration::from_secs(20)).await;

    // Assert: the first attempt plus five retries, then nothing
    assert_eq!(session.connector.open_count(), 6);
    let status = session.client.status();
    assert!(status.reconnect_exhausted);
    assert_eq!(
        status.phase,
        SessionPhase::Halted(HaltReason::ReconnectExhausted)
    );
    assert_eq!(session.client.state(), ConnectionState::Disconnected);
    assert_eq!(
        pending.await.unwrap(),
        Err(FeedError::ReconnectExhausted { attempts: 5 })
    );

    advance(Duration::from_secs(120)).await;
    assert_eq!(session.connector.open_count(), 6);

    let events = session.drain_events();
    assert_eq!(count_closed(&events), 6);
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Error(_))));
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_fixed_delay() {
    let session = TestSession::connected().await;
    session.connector.set_behaviour(MockBehaviour::Manual);

    session.connector.drop_connection(1006, "reset");
    advance(Duration::from_millis(2_900)).await;
    assert_eq!(session.connector.open_count(), 1);
    assert_eq!(session.client.status().reconnect_attempts, 1);

    advance(Duration::from_millis(200)).await;
    assert_eq!(session.connector.open_count(), 2);

    // Second consecutive failure waits the same delay, no backoff growth
    session.connector.drop_connection(1006, "reset");
    advance(Duration::from_millis(2_900)).await;
    assert_eq!(session.connector.open_count(), 2);
    advance(Duration::from_millis(200)).await;
    assert_eq!(session.connector.open_count(), 3);
    assert_eq!(session.client.status().reconnect_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_successful_reconnect_fires_reconnected_and_resets_attempts() {
    // Arrange
    let mut session = TestSession::connected().await;

    // Act
    session.connector.drop_connection(1006, "reset");
    advance(Duration::from_millis(3_100)).await;

    // Assert
    assert!(session.client.is_connected());
    assert_eq!(session.client.status().reconnect_attempts, 0);
    assert_eq!(
        session.drain_events(),
        vec![
            SessionEvent::Connected,
            SessionEvent::Closed(CloseInfo::abnormal("reset")),
            SessionEvent::Reconnected,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_retry() {
    let session = TestSession::connected().await;

    session.connector.drop_connection(1006, "reset");
    settle().await;
    assert_eq!(
        session.client.status().phase,
        SessionPhase::RetryPending { attempt: 1 }
    );

    session.client.disconnect();
    advance(Duration::from_secs(30)).await;

    assert_eq!(session.connector.open_count(), 1);
    assert_eq!(session.client.status().phase, SessionPhase::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_connect_after_exhaustion_resets_policy() {
    // Arrange: exhaust the policy
    let mut session = TestSession::start_with(
        MockConnector::new(MockBehaviour::Refuse),
        SessionSettings {
            reconnect_limit: 2,
            ..SessionSettings::default()
        },
    );
    let pending = tokio::spawn(session.client.connect());
    advance(Duration::from_secs(20)).await;
    assert_eq!(session.connector.open_count(), 3);
    assert!(pending.await.unwrap().is_err());

    // Act
    session.connector.set_behaviour(MockBehaviour::Accept);
    let result = session.client.connect().await;

    // Assert
    assert_eq!(result, Ok(()));
    let status = session.client.status();
    assert!(!status.reconnect_exhausted);
    assert_eq!(status.reconnect_attempts, 0);
    assert!(session.drain_events().contains(&SessionEvent::Reconnected));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_after_exhaustion_clears_exhaustion() {
    // Arrange
    let session = TestSession::start_with(
        MockConnector::new(MockBehaviour::Refuse),
        SessionSettings {
            reconnect_limit: 2,
            ..SessionSettings::default()
        },
    );
    let pending = tokio::spawn(session.client.connect());
    advance(Duration::from_secs(20)).await;
    assert!(session.client.status().reconnect_exhausted);
    assert!(pending.await.unwrap().is_err());

    // Act
    session.client.disconnect();
    settle().await;

    // Assert
    let status = session.client.status();
    assert_eq!(status.phase, SessionPhase::Closed);
    assert_eq!(status.reconnect_attempts, 0);
    assert!(!status.reconnect_exhausted);
}

#[tokio::test(start_paused = true)]
async fn test_drop_before_handshake_counts_as_attempt() {
    let session = TestSession::connected().await;
    session.connector.set_behaviour(MockBehaviour::Manual);

    session.connector.drop_connection(1006, "reset");
    advance(Duration::from_millis(3_100)).await;
    // Retry link opens but the server never acknowledges it
    session.connector.open_latest();
    settle().await;
    session.connector.drop_connection(1006, "reset again");
    settle().await;

    assert_eq!(session.client.status().reconnect_attempts, 2);
    assert_eq!(
        session.client.status().phase,
        SessionPhase::RetryPending { attempt: 2 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_never_retries() {
    let session = TestSession::connected_with(SessionSettings {
        reconnect_limit: 0,
        ..SessionSettings::default()
    })
    .await;

    session.connector.drop_connection(1006, "reset");
    advance(Duration::from_secs(30)).await;

    assert_eq!(session.connector.open_count(), 1);
    assert!(session.client.status().reconnect_exhausted);
}
