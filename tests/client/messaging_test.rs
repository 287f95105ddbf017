// Client Messaging Tests
// Tests for posting, request/reply and the roster queries across instances

use crate::common::{config, config_with_ttl, connected, FakeMaster, StaticRoster};
use cluster_link::client::{NetworkClient, GET_PLAYER};
use cluster_link::protocol::{InstanceMessage, MessageTarget};
use cluster_link::ScheduledTask;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Player {
    uid: String,
    name: String,
}

async fn instance(
    master: &Arc<FakeMaster>,
    players: &[(&str, &str)],
    ttl: Duration,
) -> (NetworkClient, ScheduledTask) {
    let mut builder = NetworkClient::builder(config_with_ttl(ttl)).transport(master.clone());
    if !players.is_empty() {
        builder = builder.roster(StaticRoster::new(players));
    }
    let client = builder.build().unwrap();
    client.connect().await.unwrap();
    let poller = client.spawn_poll_loop(Duration::from_millis(100), |_| {});
    (client, poller)
}

// ============================================================================
// POSTING
// ============================================================================

#[tokio::test]
async fn test_send_message_stamps_sender() {
    let master = FakeMaster::new();
    let client = connected(&master).await;

    client
        .send_message(InstanceMessage::direct("Kick", json!({"uid": "u9"}), "client-7"))
        .await
        .unwrap();

    let posted = master.posted();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].sender(), "client-1");
    assert_eq!(
        posted[0].target(),
        &MessageTarget::Direct {
            receiver: "client-7".to_string()
        }
    );
}

#[tokio::test]
async fn test_send_before_connect_fails() {
    let master = FakeMaster::new();
    let client = NetworkClient::builder(config())
        .transport(master.clone())
        .build()
        .unwrap();

    assert!(client
        .send_message(InstanceMessage::broadcast("Hello", json!(null)))
        .await
        .is_err());
    assert!(master.posted().is_empty());
}

#[tokio::test]
async fn test_broadcast_reaches_other_instances_only() {
    let master = FakeMaster::new();
    let a = connected(&master).await;
    let b = connected(&master).await;

    a.send_message(InstanceMessage::broadcast("Hello", json!(1)))
        .await
        .unwrap();

    let to_b = b.poll().await.unwrap();
    let to_a = a.poll().await.unwrap();
    assert_eq!(to_b.messages.len(), 1);
    assert_eq!(to_b.messages[0].sender(), "client-1");
    assert!(to_a.messages.is_empty());
}

// ============================================================================
// GET PLAYER
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_get_player_answered_by_other_instance() {
    let master = FakeMaster::new();
    let (_a, poll_a) = instance(&master, &[("u1", "Alice")], Duration::from_secs(60)).await;
    let (b, poll_b) = instance(&master, &[], Duration::from_secs(60)).await;

    let player: Option<Player> = b.get_player("u1").await;

    assert_eq!(
        player,
        Some(Player {
            uid: "u1".to_string(),
            name: "Alice".to_string()
        })
    );
    let request = master
        .posted()
        .into_iter()
        .find(|m| m.subject() == GET_PLAYER)
        .unwrap();
    let reply = master
        .posted()
        .into_iter()
        .find(|m| m.subject() == "GetPlayerRes")
        .unwrap();
    assert_eq!(reply.reference_id(), request.reference_id());
    assert_eq!(reply.sender(), "client-1");
    assert_eq!(b.correlator_stats().resolved, 1);

    poll_a.stop().await;
    poll_b.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_get_player_times_out_when_nobody_has_it() {
    let master = FakeMaster::new();
    let (_a, poll_a) = instance(&master, &[("u1", "Alice")], Duration::from_secs(2)).await;
    let (b, poll_b) = instance(&master, &[], Duration::from_secs(2)).await;

    let started = tokio::time::Instant::now();
    let player: Option<Player> = b.get_player("ghost").await;

    assert_eq!(player, None);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(b.correlator_stats().expired, 1);
    assert_eq!(b.correlator().pending_count(), 0);

    poll_a.stop().await;
    poll_b.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_get_player_found_locally_without_network() {
    let master = FakeMaster::new();
    let (a, poll_a) = instance(&master, &[("u1", "Alice")], Duration::from_secs(60)).await;

    let player: Option<Player> = a.get_player("u1").await;

    assert_eq!(player.map(|p| p.name), Some("Alice".to_string()));
    assert!(master.posted().is_empty());
    poll_a.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_get_all_players_collects_every_instance() {
    let master = FakeMaster::new();
    let (_a, poll_a) = instance(&master, &[("u1", "Alice"), ("u2", "Bob")], Duration::from_secs(5)).await;
    let (_b, poll_b) = instance(&master, &[("u3", "Cara")], Duration::from_secs(5)).await;
    let (c, poll_c) = instance(&master, &[("u4", "Dan")], Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(c.membership().others().len(), 2);

    let mut players: Vec<Player> = c.get_all_players().await;
    players.sort_by(|x, y| x.uid.cmp(&y.uid));

    let uids: Vec<&str> = players.iter().map(|p| p.uid.as_str()).collect();
    assert_eq!(uids, vec!["u1", "u2", "u3", "u4"]);

    poll_a.stop().await;
    poll_b.stop().await;
    poll_c.stop().await;
}

// ============================================================================
// CUSTOM REQUESTS
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_request_resolves_on_reply_subject() {
    let master = FakeMaster::new();
    let (a, poll_a) = instance(&master, &[], Duration::from_secs(60)).await;
    let b = connected(&master).await;

    let requester = a.clone();
    let waiting = tokio::spawn(async move {
        requester
            .request(InstanceMessage::direct("Status", json!(null), "client-2"))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // b answers by hand from its own poll
    let inbound = b.poll().await.unwrap();
    let status = inbound.messages.into_iter().find(|m| m.subject() == "Status").unwrap();
    b.send_message(status.reply(json!({"players": 12}))).await.unwrap();

    let outcome = waiting.await.unwrap().unwrap();
    assert_eq!(outcome.into_message().unwrap().payload(), &json!({"players": 12}));
    poll_a.stop().await;
}
