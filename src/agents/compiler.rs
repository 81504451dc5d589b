//! Per-user compiler agents
//!
//! Each registered participant gets one [`UserCompiler`]. The compiler keeps
//! that user's view of the roadmap and forwards notifications addressed to
//! the user out through the hub's outbound channel. It owns no timer: the
//! task ends when the manager unregisters it from the bus and its receiver
//! drains.

use crate::bus::{Message, MessageKind};
use crate::error::Result;
use crate::intake::OutboundResponse;
use crate::storage::{collections, DocumentStore};
use crate::types::{AgentId, Roadmap};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

pub struct UserCompiler {
    id: AgentId,
    user_id: String,
    store: Arc<dyn DocumentStore>,
    outbound: mpsc::UnboundedSender<OutboundResponse>,
    roadmap: Mutex<Option<Roadmap>>,
}

impl UserCompiler {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        outbound: mpsc::UnboundedSender<OutboundResponse>,
    ) -> Self {
        let user_id = user_id.into();
        Self {
            id: AgentId::user_compiler(&user_id),
            user_id,
            store,
            outbound,
            roadmap: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Drain the bus receiver until the manager unregisters this agent
    pub fn spawn(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(user_id = %self.user_id, "User compiler started");
            // Unregistration drops the bus-side sender; recv then yields
            // None and the task ends without a shutdown channel.
            while let Some(message) = bus_rx.recv().await {
                if let Err(e) = self.handle(message).await {
                    warn!(user_id = %self.user_id, error = %e, "Compiler event failed");
                }
            }
            info!(user_id = %self.user_id, "User compiler stopped");
        })
    }

    async fn handle(&self, message: Message) -> Result<()> {
        // Kind subscriptions are shared across compilers; broadcast copies
        // arrive retargeted to this id, anything else is for another agent.
        if !message.target.is_for(&self.id) {
            return Ok(());
        }
        match message.kind {
            MessageKind::RoadmapUpdate => {
                let roadmap: Roadmap = serde_json::from_value(message.payload)?;
                debug!(user_id = %self.user_id, version = roadmap.version, "Compiler roadmap view updated");
                self.store
                    .set(
                        collections::ROADMAPS,
                        &format!("user_{}", self.user_id),
                        serde_json::to_value(&roadmap)?,
                    )
                    .await?;
                *self.roadmap.lock().await = Some(roadmap);
                Ok(())
            }
            MessageKind::Notification | MessageKind::SystemAlert => {
                let _ = self.outbound.send(OutboundResponse {
                    user_id: self.user_id.clone(),
                    message_id: None,
                    ok: true,
                    body: message.payload,
                });
                Ok(())
            }
            other => {
                debug!(kind = %other, "Compiler ignoring bus message");
                Ok(())
            }
        }
    }

    pub async fn roadmap_version(&self) -> Option<u64> {
        self.roadmap.lock().await.as_ref().map(|r| r.version)
    }
}
