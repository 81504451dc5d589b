//! Intake pipeline integration tests
//!
//! Exercises the submit-to-response path end to end: priority ordering in
//! the queue, LLM classification through the processor pool, publication to
//! the decision engine's subscription, and the failure acknowledgment path.

mod common;

use agora_core::intake::{CommunicationHub, MessageProcessor};
use agora_core::types::{AgentId, ProcessedMessage};
use agora_core::MessageKind;
use common::ScriptedProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

async fn hub_with_provider(
    provider: Arc<ScriptedProvider>,
) -> (
    Arc<CommunicationHub>,
    mpsc::UnboundedReceiver<agora_core::OutboundResponse>,
    mpsc::UnboundedReceiver<agora_core::Message>,
    broadcast::Sender<()>,
) {
    let (bus, _store) = common::test_bus();
    let store: Arc<agora_core::MemoryStore> = Arc::new(agora_core::MemoryStore::new());

    let processors = [
        Arc::new(MessageProcessor::new(
            AgentId::new("processor_1"),
            provider.clone(),
            "model-small",
            "model-small",
            5,
        )),
        Arc::new(MessageProcessor::new(
            AgentId::new("processor_2"),
            provider,
            "model-small",
            "model-small",
            5,
        )),
    ];

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let errors = Arc::new(agora_core::health::ErrorTracker::new());
    let hub = Arc::new(CommunicationHub::new(
        bus.clone(),
        store,
        processors,
        outbound_tx,
        errors,
        Duration::from_millis(10),
    ));

    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    bus.register_agent(
        AgentId::new("decision_engine"),
        &[MessageKind::UserCommunication],
        engine_tx,
    )
    .await;

    let (hub_tx, hub_bus_rx) = mpsc::unbounded_channel();
    bus.register_agent(hub.id().clone(), &[MessageKind::Notification], hub_tx)
        .await;

    let (shutdown, _) = broadcast::channel(1);
    hub.clone().spawn(hub_bus_rx, shutdown.subscribe());

    (hub, outbound_rx, engine_rx, shutdown)
}

#[tokio::test]
async fn test_submit_reaches_engine_and_transport() {
    let provider = Arc::new(ScriptedProvider::with_urgency("high"));
    let (hub, mut outbound, mut engine_rx, _shutdown) = hub_with_provider(provider).await;

    let id = hub
        .submit(
            "alice",
            "Alice",
            "the API returns 500s and I am blocked",
            serde_json::json!({"status": "blocked"}),
        )
        .await;

    let bus_message = timeout(Duration::from_secs(2), engine_rx.recv())
        .await
        .expect("engine delivery timed out")
        .unwrap();
    assert_eq!(bus_message.kind, MessageKind::UserCommunication);
    let processed: ProcessedMessage =
        serde_json::from_value(bus_message.payload.clone()).unwrap();
    assert_eq!(processed.message.id, id);
    assert_eq!(processed.intent, "status_update");
    // Post-classification urgency drives the bus priority.
    assert_eq!(bus_message.priority, processed.urgency.as_priority());

    let response = timeout(Duration::from_secs(2), outbound.recv())
        .await
        .expect("outbound response timed out")
        .unwrap();
    assert!(response.ok);
    assert_eq!(response.message_id, Some(id));
    assert_eq!(response.body["intent"], "status_update");
}

#[tokio::test]
async fn test_classification_failure_yields_generic_ack() {
    let provider = Arc::new(ScriptedProvider::failing());
    let (hub, mut outbound, mut engine_rx, _shutdown) = hub_with_provider(provider).await;

    let id = hub
        .submit("bob", "Bob", "how do I deploy?", serde_json::json!({}))
        .await;

    let response = timeout(Duration::from_secs(2), outbound.recv())
        .await
        .expect("failure ack timed out")
        .unwrap();
    assert!(!response.ok);
    assert_eq!(response.message_id, Some(id));
    assert_eq!(response.body["status"], "failed_to_process");

    // Nothing is published for a failed classification, and the message is
    // not retried.
    assert!(
        timeout(Duration::from_millis(200), engine_rx.recv())
            .await
            .is_err(),
        "no bus publication on failure"
    );
    assert_eq!(hub.queue_depth().await, 0);
}

#[tokio::test]
async fn test_both_processors_used_under_burst() {
    let provider = Arc::new(ScriptedProvider::new());
    let (hub, mut outbound, _engine_rx, _shutdown) = hub_with_provider(provider.clone()).await;

    for n in 0..6 {
        hub.submit(
            format!("user_{n}"),
            "User",
            "steady progress",
            serde_json::json!({}),
        )
        .await;
    }

    for _ in 0..6 {
        let response = timeout(Duration::from_secs(2), outbound.recv())
            .await
            .expect("burst response timed out")
            .unwrap();
        assert!(response.ok);
    }
    // Two LLM calls per message: classification plus urgency.
    assert_eq!(
        provider.calls.load(std::sync::atomic::Ordering::SeqCst),
        12
    );
}
