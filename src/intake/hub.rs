//! Communication hub
//!
//! Bridges external transports into the bus: `submit` enqueues inbound
//! messages under a cheap priority heuristic and returns immediately; a
//! 100ms poller drains the queue into the processor pool; processed results
//! go out both as `UserCommunication` bus messages for the decision engine
//! and as [`OutboundResponse`]s on the transport channel. The hub also
//! forwards user-addressed `Notification` bus messages back out.

use crate::bus::{Message, MessageBus, MessageKind, Target};
use crate::error::Result;
use crate::health::ErrorTracker;
use crate::intake::processor::MessageProcessor;
use crate::intake::queue::PriorityIntakeQueue;
use crate::storage::{collections, DocumentStore};
use crate::types::{priority, AgentId, ProcessedMessage, UserMessage};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Keywords that elevate intake priority before classification
const URGENT_KEYWORDS: &[&str] = &["blocked", "critical", "urgent", "help", "error", "broken"];

/// Heuristic intake priority, computed before any LLM call
///
/// Governs intake-queue order only; the post-classification urgency
/// independently sets the outbound bus priority.
pub fn intake_priority(content: &str, context: &Value) -> u8 {
    let lowered = content.to_lowercase();
    let keyword_hit = URGENT_KEYWORDS.iter().any(|k| lowered.contains(k));
    let blocked_status = context
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s == "blocked")
        .unwrap_or(false);

    if keyword_hit || blocked_status {
        priority::HIGH
    } else {
        priority::NORMAL
    }
}

/// Application-level response pushed back to the originating transport
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub user_id: String,
    /// Intake message id this responds to, when applicable
    pub message_id: Option<Uuid>,
    pub ok: bool,
    pub body: Value,
}

/// Owns the intake queue and the dual-processor pool
pub struct CommunicationHub {
    id: AgentId,
    queue: Mutex<PriorityIntakeQueue<UserMessage>>,
    processors: [Arc<MessageProcessor>; 2],
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    outbound: mpsc::UnboundedSender<OutboundResponse>,
    errors: Arc<ErrorTracker>,
    poll_interval: Duration,
    decision_engine: AgentId,
}

impl CommunicationHub {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn DocumentStore>,
        processors: [Arc<MessageProcessor>; 2],
        outbound: mpsc::UnboundedSender<OutboundResponse>,
        errors: Arc<ErrorTracker>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id: AgentId::new("communication_hub"),
            queue: Mutex::new(PriorityIntakeQueue::new()),
            processors,
            bus,
            store,
            outbound,
            errors,
            poll_interval,
            decision_engine: AgentId::new("decision_engine"),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Ingest a user message; returns the intake id immediately
    ///
    /// Fire-and-forget from the caller's perspective: the response arrives
    /// asynchronously on the outbound channel.
    pub async fn submit(
        &self,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        content: impl Into<String>,
        context: Value,
    ) -> Uuid {
        let content = content.into();
        let queue_priority = intake_priority(&content, &context);
        let message = UserMessage::new(user_id, user_name, content, context);
        let id = message.id;

        debug!(message_id = %id, priority = queue_priority, "Enqueued user message");
        self.queue.lock().await.enqueue(message, queue_priority);
        id
    }

    /// Intake queue depth (diagnostics)
    pub async fn queue_depth(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Run the poll loop until shutdown
    ///
    /// `bus_rx` carries this hub's bus subscription (user-addressed
    /// notifications to forward out).
    pub fn spawn(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.poll_interval);
            info!(interval_ms = self.poll_interval.as_millis() as u64, "Communication hub started");

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        loop {
                            let next = self.queue.lock().await.dequeue();
                            match next {
                                Some(message) => self.dispatch(message),
                                None => break,
                            }
                        }
                    }
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => self.handle_bus_message(message),
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Communication hub received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    /// Pick a processor per the load-balancing policy
    ///
    /// Prefer the first when available; both available picks the smaller
    /// pending count (tie goes first); neither available falls back to the
    /// second best-effort, with no backpressure to the producer.
    fn select_processor(&self) -> Arc<MessageProcessor> {
        let [first, second] = &self.processors;
        match (first.is_available(), second.is_available()) {
            (true, true) => {
                if second.pending() < first.pending() {
                    Arc::clone(second)
                } else {
                    Arc::clone(first)
                }
            }
            (true, false) => Arc::clone(first),
            (false, true) => Arc::clone(second),
            (false, false) => {
                warn!(
                    first_pending = first.pending(),
                    second_pending = second.pending(),
                    "Both processors saturated, assigning to second anyway"
                );
                Arc::clone(second)
            }
        }
    }

    fn dispatch(self: &Arc<Self>, message: UserMessage) {
        let processor = self.select_processor();
        processor.reserve();

        let hub = Arc::clone(self);
        let user_id = message.user_id.clone();
        let message_id = message.id;
        tokio::spawn(async move {
            match processor.process(message).await {
                Ok(processed) => {
                    if let Err(e) = hub.publish_processed(&processed).await {
                        warn!(error = %e, message_id = %message_id, "Failed to publish processed message");
                        hub.errors.record();
                    }
                }
                Err(e) => {
                    warn!(error = %e, message_id = %message_id, "Message processing failed");
                    hub.errors.record();
                    // Generic acknowledgment, never a raw error; the item is
                    // not re-enqueued.
                    let _ = hub.outbound.send(OutboundResponse {
                        user_id,
                        message_id: Some(message_id),
                        ok: false,
                        body: json!({"status": "failed_to_process"}),
                    });
                }
            }
        });
    }

    async fn publish_processed(&self, processed: &ProcessedMessage) -> Result<()> {
        // Bus priority comes from the LLM urgency, independent of the intake
        // heuristic that ordered the queue.
        let bus_priority = processed.urgency.as_priority();
        let message = Message::new(
            MessageKind::UserCommunication,
            processed.agent_id.clone(),
            Target::Agent(self.decision_engine.clone()),
            serde_json::to_value(processed)?,
            bus_priority,
        );
        self.bus.send(message).await?;

        self.store
            .set(
                collections::PROCESSED_MESSAGES,
                &processed.message.id.to_string(),
                serde_json::to_value(processed)?,
            )
            .await?;

        let _ = self.outbound.send(OutboundResponse {
            user_id: processed.message.user_id.clone(),
            message_id: Some(processed.message.id),
            ok: true,
            body: json!({
                "intent": processed.intent,
                "urgency": processed.urgency,
                "suggested_action": processed.suggested_action,
            }),
        });

        Ok(())
    }

    fn handle_bus_message(&self, message: Message) {
        match message.kind {
            MessageKind::Notification => {
                // Forward user-addressed notifications to the transport;
                // agent-internal notifications have no user_id.
                if let Some(user_id) = message.payload.get("user_id").and_then(Value::as_str) {
                    let _ = self.outbound.send(OutboundResponse {
                        user_id: user_id.to_string(),
                        message_id: None,
                        ok: true,
                        body: message.payload.clone(),
                    });
                }
            }
            other => debug!(kind = %other, "Communication hub ignoring bus message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intake_priority_keywords() {
        assert_eq!(
            intake_priority("I'm totally blocked on the API", &json!({})),
            priority::HIGH
        );
        assert_eq!(
            intake_priority("URGENT: demo in ten minutes", &json!({})),
            priority::HIGH
        );
        assert_eq!(
            intake_priority("making steady progress", &json!({})),
            priority::NORMAL
        );
    }

    #[test]
    fn test_intake_priority_blocked_status() {
        assert_eq!(
            intake_priority("all good here", &json!({"status": "blocked"})),
            priority::HIGH
        );
        assert_eq!(
            intake_priority("all good here", &json!({"status": "active"})),
            priority::NORMAL
        );
    }
}
