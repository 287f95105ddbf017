// Client Lifecycle Tests
// Tests for connect, disconnect and the background push task

use crate::common::{config, connected, FakeMaster, RecordingNode};
use cluster_link::client::{ClientConfig, ClientError, InstanceAuthority, NetworkClient};
use cluster_link::correlator::ReplyOutcome;
use cluster_link::handshake::{HandshakeError, HandshakeState};
use cluster_link::protocol::{InstanceMessage, NetHealthData};
use cluster_link::sync::{PollPolicy, PollTick, PLUGINS_KEY, ROUND_KEY, STARTUP_KEY};
use serde_json::json;
use std::time::Duration;

// ============================================================================
// CONSTRUCTION
// ============================================================================

#[test]
fn test_invalid_config_rejected() {
    let result = NetworkClient::new(ClientConfig::new("http://master", ""));

    assert!(matches!(result, Err(ClientError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_fresh_client_is_idle() {
    let master = FakeMaster::new();
    let client = NetworkClient::builder(config().with_migration_priority_seed(40))
        .transport(master)
        .build()
        .unwrap();

    assert_eq!(client.state(), HandshakeState::Idle);
    assert!(!client.is_started());
    assert_eq!(client.client_identifier(), None);
    assert_eq!(client.migration_priority(), 40);
    assert!(client.poll().await.is_none());
}

// ============================================================================
// CONNECT
// ============================================================================

#[tokio::test]
async fn test_connect_authenticates_and_installs_session() {
    let master = FakeMaster::new();
    let client = connected(&master).await;

    assert!(client.is_started());
    assert!(client.is_authenticated());
    assert_eq!(client.state(), HandshakeState::Authenticated);
    assert_eq!(client.client_identifier().as_deref(), Some("client-1"));
    assert_eq!(client.migration_priority(), 1);
    assert!(client.session_token().is_some());
}

#[tokio::test]
async fn test_second_connect_is_rejected() {
    let master = FakeMaster::new();
    let client = connected(&master).await;

    assert!(matches!(client.connect().await, Err(ClientError::AlreadyStarted)));
    assert_eq!(master.client_ids().len(), 1);
}

#[tokio::test]
async fn test_failed_connect_can_be_retried() {
    let master = FakeMaster::new();
    master.set_break_key_exchange(true);
    let client = NetworkClient::builder(config())
        .transport(master.clone())
        .build()
        .unwrap();

    let error = client.connect().await.unwrap_err();
    assert!(matches!(error, ClientError::Handshake(HandshakeError::Crypto(_))));
    assert!(!client.is_started());
    assert!(client.state().is_failed());
    assert_eq!(client.session_token(), None);

    master.set_break_key_exchange(false);
    client.connect().await.unwrap();
    assert!(client.is_authenticated());
}

#[tokio::test]
async fn test_nodes_started_then_reconfigured() {
    let master = FakeMaster::new();
    let node = RecordingNode::new();
    let client = NetworkClient::builder(config().with_authority(InstanceAuthority::Master))
        .transport(master)
        .node(node.clone())
        .build()
        .unwrap();

    client.connect().await.unwrap();

    assert_eq!(*node.events.lock(), vec!["start_client", "reconfigure"]);
    assert_eq!(*node.authority.lock(), Some(InstanceAuthority::Master));
}

#[tokio::test]
async fn test_startup_entries_published_locally() {
    let master = FakeMaster::new();
    let client = connected(&master).await;
    let store = client.sync_store();

    assert!(store.contains(PLUGINS_KEY));
    assert!(store.contains(ROUND_KEY));
    let health: NetHealthData = store.get(STARTUP_KEY).unwrap();
    assert_eq!(health.client_id, "client-1");
    assert_eq!(health.client_name, "test-instance");
    assert_eq!(health.startup_timestamp, client.created_at().timestamp());
}

// ============================================================================
// PUSH TASK
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_push_task_runs_on_interval() {
    let master = FakeMaster::new();
    let client = connected(&master).await;

    tokio::time::sleep(Duration::from_secs(11)).await;

    let pushes = master.pushes();
    assert_eq!(pushes.len(), 3);
    assert!(pushes.iter().all(|(id, _)| id == "client-1"));
    assert!(pushes[0].1.iter().any(|e| e.key == ROUND_KEY));
    drop(client);
}

#[tokio::test(start_paused = true)]
async fn test_no_push_after_disconnect() {
    let master = FakeMaster::new();
    let client = connected(&master).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    client.disconnect().await;
    let count = master.pushes().len();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(master.pushes().len(), count);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_stops_push_task() {
    let master = FakeMaster::new();
    let client = connected(&master).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    drop(client);
    let count = master.pushes().len();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(master.pushes().len(), count);
}

// ============================================================================
// DISCONNECT
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_requests() {
    let master = FakeMaster::new();
    let client = connected(&master).await;

    let requester = client.clone();
    let waiting = tokio::spawn(async move {
        requester
            .request(InstanceMessage::broadcast("GetPlayer", json!("u1")))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.correlator().pending_count(), 1);

    client.disconnect().await;

    assert_eq!(waiting.await.unwrap().unwrap(), ReplyOutcome::Cancelled);
    assert_eq!(client.state(), HandshakeState::Disconnected);
    assert!(!client.is_started());
    assert_eq!(client.session_token(), None);
    assert_eq!(client.client_identifier(), None);
    assert_eq!(master.releases(), 1);
}

#[tokio::test]
async fn test_operations_after_disconnect_fail() {
    let master = FakeMaster::new();
    let client = connected(&master).await;
    client.disconnect().await;

    let result = client
        .send_message(InstanceMessage::broadcast("Hello", json!(null)))
        .await;

    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert!(client.poll().await.is_none());
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let master = FakeMaster::new();
    let client = connected(&master).await;
    client.disconnect().await;

    client.connect().await.unwrap();

    assert_eq!(client.client_identifier().as_deref(), Some("client-2"));
    assert!(client.poll().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_handshake_abandons_connect() {
    let master = FakeMaster::new();
    master.set_delay("/auth", Duration::from_secs(1));
    let client = NetworkClient::builder(config())
        .transport(master.clone())
        .build()
        .unwrap();

    let connecting = client.clone();
    let pending = tokio::spawn(async move { connecting.connect().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.disconnect().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert!(!client.is_started());
    assert_eq!(client.state(), HandshakeState::Disconnected);
    assert_eq!(client.session_token(), None);
    assert_eq!(client.client_identifier(), None);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(master.pushes().is_empty());

    master.set_delay("/auth", Duration::ZERO);
    client.connect().await.unwrap();
    assert!(client.is_authenticated());
    assert_eq!(client.client_identifier().as_deref(), Some("client-2"));
}

#[tokio::test(start_paused = true)]
async fn test_dropped_connect_leaves_client_reconnectable() {
    let master = FakeMaster::new();
    master.set_delay("/auth", Duration::from_secs(5));
    let client = NetworkClient::builder(config())
        .transport(master.clone())
        .build()
        .unwrap();

    let timed_out = tokio::time::timeout(Duration::from_secs(1), client.connect()).await;
    assert!(timed_out.is_err());

    assert!(!client.is_started());
    assert!(client.state().is_failed());
    assert_eq!(client.session_token(), None);

    master.set_delay("/auth", Duration::ZERO);
    client.connect().await.unwrap();
    assert!(client.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_poll_in_flight_at_disconnect_is_discarded() {
    let master = FakeMaster::new();
    let node = RecordingNode::new();
    let client = NetworkClient::builder(config())
        .transport(master.clone())
        .node(node.clone())
        .build()
        .unwrap();
    client.connect().await.unwrap();
    master.set_delay("/ping", Duration::from_secs(1));
    master.queue("client-1", InstanceMessage::broadcast("Late", json!(1)));

    let poller = client.clone();
    let pending = tokio::spawn(async move { poller.poll().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.disconnect().await;

    assert!(pending.await.unwrap().is_none());
    assert!(client.membership().is_empty());
    assert_eq!(client.latest_var_hash(), None);
    assert!(node.received.lock().is_empty());
}

#[tokio::test]
async fn test_disconnect_before_connect_is_harmless() {
    let master = FakeMaster::new();
    let client = NetworkClient::builder(config())
        .transport(master)
        .build()
        .unwrap();

    client.disconnect().await;

    assert_eq!(client.state(), HandshakeState::Idle);
}

// ============================================================================
// POLL LOOP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_poll_loop_reports_limit() {
    let master = FakeMaster::new();
    let client = NetworkClient::builder(
        config().with_poll_policy(PollPolicy::new().with_missed_poll_limit(3)),
    )
    .transport(master.clone())
    .build()
    .unwrap();
    client.connect().await.unwrap();
    master.set_fail_pings(true);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let poller = client.spawn_poll_loop(Duration::from_secs(1), move |tick| {
        let _ = tx.send(tick);
    });

    let mut ticks = Vec::new();
    while ticks.len() < 3 {
        ticks.push(rx.recv().await.unwrap());
    }
    poller.stop().await;

    assert!(matches!(ticks[0], PollTick::Missed { consecutive: 1 }));
    assert!(matches!(ticks[2], PollTick::LimitReached { consecutive: 3 }));
    // The client never reconnects on its own
    assert!(client.is_authenticated());
}
