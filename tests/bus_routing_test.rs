//! Message bus routing integration tests
//!
//! Covers the delivery semantics agents rely on: per-subscriber FIFO,
//! broadcast fan-out with per-recipient retargeting, the compiler group
//! membership snapshot, and idempotent re-registration.

mod common;

use agora_core::bus::{HistoryFilter, Message, MessageBus, Target};
use agora_core::types::{priority, AgentId};
use agora_core::MessageKind;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn message(kind: MessageKind, target: Target, tag: u64) -> Message {
    Message::new(
        kind,
        AgentId::new("test_source"),
        target,
        json!({ "tag": tag }),
        priority::NORMAL,
    )
}

#[tokio::test]
async fn test_subscriber_receives_in_publish_order() {
    let (bus, _store) = common::test_bus();
    let (tx, mut rx) = mpsc::unbounded_channel();
    bus.register_agent(
        AgentId::new("observer"),
        &[MessageKind::Notification],
        tx,
    )
    .await;

    for tag in 0..10u64 {
        bus.send(message(
            MessageKind::Notification,
            Target::Agent(AgentId::new("observer")),
            tag,
        ))
        .await
        .unwrap();
    }

    for expected in 0..10u64 {
        let received = rx.recv().await.unwrap();
        assert_eq!(received.payload["tag"], expected);
    }
}

#[tokio::test]
async fn test_all_agents_broadcast_retargets_each_copy() {
    let core: Vec<AgentId> = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(AgentId::new)
        .collect();
    let store = Arc::new(agora_core::MemoryStore::new());
    let bus = Arc::new(MessageBus::new(store, 256, core.clone()));

    let mut receivers = Vec::new();
    for id in &core {
        let (tx, rx) = mpsc::unbounded_channel();
        bus.register_agent(id.clone(), &[], tx).await;
        receivers.push((id.clone(), rx));
    }

    bus.send(message(MessageKind::SystemAlert, Target::AllAgents, 7))
        .await
        .unwrap();

    for (id, rx) in &mut receivers {
        let copy = rx.recv().await.unwrap();
        // Each copy is addressed to its recipient but otherwise unchanged.
        assert_eq!(copy.target, Target::Agent(id.clone()));
        assert_eq!(copy.kind, MessageKind::SystemAlert);
        assert_eq!(copy.payload["tag"], 7);
    }
}

#[tokio::test]
async fn test_compiler_broadcast_uses_membership_at_send_time() {
    let (bus, _store) = common::test_bus();

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    bus.register_agent(AgentId::user_compiler("a"), &[], tx_a)
        .await;

    bus.send(message(
        MessageKind::RoadmapUpdate,
        Target::AllUserCompilers,
        1,
    ))
    .await
    .unwrap();

    // A compiler registered after the send sees only later traffic.
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    bus.register_agent(AgentId::user_compiler("b"), &[], tx_b)
        .await;

    bus.send(message(
        MessageKind::RoadmapUpdate,
        Target::AllUserCompilers,
        2,
    ))
    .await
    .unwrap();

    assert_eq!(rx_a.recv().await.unwrap().payload["tag"], 1);
    assert_eq!(rx_a.recv().await.unwrap().payload["tag"], 2);
    assert_eq!(rx_b.recv().await.unwrap().payload["tag"], 2);
    assert!(rx_b.try_recv().is_err());
}

#[tokio::test]
async fn test_reregistration_replaces_channel_without_duplicates() {
    let (bus, _store) = common::test_bus();
    let id = AgentId::new("flaky");

    let (tx_old, mut rx_old) = mpsc::unbounded_channel();
    bus.register_agent(id.clone(), &[MessageKind::Notification], tx_old)
        .await;

    // Same id re-registers after a restart.
    let (tx_new, mut rx_new) = mpsc::unbounded_channel();
    bus.register_agent(id.clone(), &[MessageKind::Notification], tx_new)
        .await;

    bus.send(message(
        MessageKind::Notification,
        Target::Agent(id.clone()),
        9,
    ))
    .await
    .unwrap();

    let received = rx_new.recv().await.unwrap();
    assert_eq!(received.payload["tag"], 9);
    assert!(rx_new.try_recv().is_err(), "no duplicate delivery");
    assert!(rx_old.try_recv().is_err(), "stale channel gets nothing");
}

#[tokio::test]
async fn test_unregistered_agent_is_skipped_and_history_survives() {
    let (bus, _store) = common::test_bus();
    let id = AgentId::new("gone");

    let (tx, rx) = mpsc::unbounded_channel();
    bus.register_agent(id.clone(), &[MessageKind::Notification], tx)
        .await;
    bus.unregister_agent(&id).await;
    drop(rx);

    bus.send(message(
        MessageKind::Notification,
        Target::Agent(id.clone()),
        3,
    ))
    .await
    .unwrap();

    let history = bus
        .history(&HistoryFilter {
            kind: Some(MessageKind::Notification),
            ..Default::default()
        })
        .await;
    assert_eq!(history.len(), 1, "undeliverable traffic is still recorded");
}
