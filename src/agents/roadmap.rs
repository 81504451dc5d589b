//! Roadmap orchestration
//!
//! The [`RoadmapOrchestrator`] is the single writer of the [`Roadmap`]
//! aggregate. Update requests arrive as `RoadmapUpdate` messages addressed to
//! it; every applied change bumps the version, persists the whole document,
//! and rebroadcasts the new roadmap to all user compilers. Its own
//! rebroadcasts come back through the bus and are skipped by source check.

use crate::bus::{Message, MessageBus, MessageKind, Target};
use crate::error::Result;
use crate::health::ErrorTracker;
use crate::storage::{collections, DocumentStore};
use crate::types::{
    AgentId, Milestone, Phase, Roadmap, RoadmapTask, TaskStatus,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};

pub struct RoadmapOrchestrator {
    id: AgentId,
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    errors: Arc<ErrorTracker>,
    roadmap: Mutex<Roadmap>,
    persist_interval: Duration,
}

impl RoadmapOrchestrator {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn DocumentStore>,
        errors: Arc<ErrorTracker>,
        persist_interval: Duration,
    ) -> Self {
        Self {
            id: AgentId::new("roadmap_orchestrator"),
            bus,
            store,
            errors,
            roadmap: Mutex::new(Roadmap::new()),
            persist_interval,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub async fn current(&self) -> Roadmap {
        self.roadmap.lock().await.clone()
    }

    pub fn spawn(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.persist_interval);
            info!("Roadmap orchestrator started");

            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                if let Err(e) = self.handle(message).await {
                                    warn!(error = %e, "Roadmap update failed");
                                    self.errors.record();
                                }
                            }
                            None => break,
                        }
                    }
                    _ = timer.tick() => {
                        if let Err(e) = self.persist().await {
                            warn!(error = %e, "Periodic roadmap persist failed");
                            self.errors.record();
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Roadmap orchestrator received shutdown signal");
                        if let Err(e) = self.persist().await {
                            warn!(error = %e, "Final roadmap persist failed");
                        }
                        break;
                    }
                }
            }
        })
    }

    async fn handle(&self, message: Message) -> Result<()> {
        // Rebroadcasts to all_user_compilers loop back here; only apply
        // requests from other agents.
        if message.source == self.id {
            return Ok(());
        }

        match message.kind {
            MessageKind::RoadmapUpdate if message.target.is_for(&self.id) => {
                self.apply_and_publish(&message.payload).await
            }
            MessageKind::UserRegistered => {
                let user_id = message
                    .payload
                    .get("user_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if user_id.is_empty() {
                    return Ok(());
                }
                self.onboard(&user_id).await
            }
            _ => Ok(()),
        }
    }

    /// Send the current roadmap to a newly registered user's compiler
    async fn onboard(&self, user_id: &str) -> Result<()> {
        let roadmap = self.roadmap.lock().await.clone();
        debug!(user_id, version = roadmap.version, "Onboarding user with current roadmap");
        let message = Message::new(
            MessageKind::RoadmapUpdate,
            self.id.clone(),
            Target::Agent(AgentId::user_compiler(user_id)),
            serde_json::to_value(&roadmap)?,
            crate::types::priority::NORMAL,
        );
        self.bus.send(message).await?;
        Ok(())
    }

    async fn apply_and_publish(&self, update: &Value) -> Result<()> {
        let snapshot = {
            let mut roadmap = self.roadmap.lock().await;
            if !apply_update(&mut roadmap, update) {
                debug!("Roadmap update carried no structural change");
                return Ok(());
            }
            roadmap.touch();
            roadmap.clone()
        };

        info!(version = snapshot.version, "Roadmap updated");
        self.store
            .set(
                collections::ROADMAPS,
                "current",
                serde_json::to_value(&snapshot)?,
            )
            .await?;

        let broadcast = Message::new(
            MessageKind::RoadmapUpdate,
            self.id.clone(),
            Target::AllUserCompilers,
            serde_json::to_value(&snapshot)?,
            crate::types::priority::NORMAL,
        );
        self.bus.send(broadcast).await?;
        Ok(())
    }

    /// Persist the whole document regardless of recent changes
    async fn persist(&self) -> Result<()> {
        let snapshot = self.roadmap.lock().await.clone();
        self.store
            .set(
                collections::ROADMAPS,
                "current",
                serde_json::to_value(&snapshot)?,
            )
            .await?;
        debug!(version = snapshot.version, "Roadmap persisted");
        Ok(())
    }
}

/// Apply one update payload; returns whether anything changed
fn apply_update(roadmap: &mut Roadmap, update: &Value) -> bool {
    let mut changed = false;

    if let Some(task) = update.get("add_task") {
        let phase_name = task
            .get("phase")
            .and_then(Value::as_str)
            .unwrap_or("Kickoff")
            .to_string();
        let new_task = RoadmapTask {
            id: task
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: task
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("untitled")
                .to_string(),
            assignee: task
                .get("assignee")
                .and_then(Value::as_str)
                .map(str::to_string),
            status: TaskStatus::Todo,
        };
        match roadmap.phases.iter_mut().find(|p| p.name == phase_name) {
            Some(phase) => phase.tasks.push(new_task),
            None => roadmap.phases.push(Phase {
                name: phase_name,
                tasks: vec![new_task],
            }),
        }
        changed = true;
    }

    if let Some(status_change) = update.get("task_status") {
        let task_id = status_change.get("id").and_then(Value::as_str);
        let status = status_change
            .get("status")
            .and_then(|s| serde_json::from_value::<TaskStatus>(s.clone()).ok());
        if let (Some(task_id), Some(status)) = (task_id, status) {
            for phase in &mut roadmap.phases {
                for task in &mut phase.tasks {
                    if task.id == task_id && task.status != status {
                        task.status = status;
                        changed = true;
                    }
                }
            }
        }
    }

    if let Some(milestone) = update.get("add_milestone") {
        if let Some(name) = milestone.get("name").and_then(Value::as_str) {
            let due = milestone
                .get("due")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok());
            roadmap.milestones.push(Milestone {
                name: name.to_string(),
                due,
                reached: false,
            });
            changed = true;
        }
    }

    if let Some(name) = update.get("milestone_reached").and_then(Value::as_str) {
        for milestone in &mut roadmap.milestones {
            if milestone.name == name && !milestone.reached {
                milestone.reached = true;
                changed = true;
            }
        }
    }

    if let Some(point) = update.get("integration_point").and_then(Value::as_str) {
        roadmap.integration_points.push(point.to_string());
        changed = true;
    }

    if let Some(risk) = update.get("risk").and_then(Value::as_str) {
        roadmap.risk_mitigation.push(risk.to_string());
        changed = true;
    }

    // Plan-level summaries from the decision engine carry no structural
    // fields; record them as risk-mitigation notes so they survive in the
    // persisted document.
    if let Some(summary) = update.get("summary").and_then(Value::as_str) {
        roadmap.risk_mitigation.push(summary.to_string());
        changed = true;
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_task_creates_phase_when_missing() {
        let mut roadmap = Roadmap::new();
        let changed = apply_update(
            &mut roadmap,
            &json!({"add_task": {"phase": "Integration", "title": "wire the API", "assignee": "alice"}}),
        );
        assert!(changed);
        let phase = roadmap
            .phases
            .iter()
            .find(|p| p.name == "Integration")
            .unwrap();
        assert_eq!(phase.tasks.len(), 1);
        assert_eq!(phase.tasks[0].assignee.as_deref(), Some("alice"));
    }

    #[test]
    fn test_task_status_change() {
        let mut roadmap = Roadmap::new();
        apply_update(
            &mut roadmap,
            &json!({"add_task": {"id": "t1", "title": "demo"}}),
        );
        let changed = apply_update(
            &mut roadmap,
            &json!({"task_status": {"id": "t1", "status": "blocked"}}),
        );
        assert!(changed);
        assert_eq!(roadmap.phases[0].tasks[0].status, TaskStatus::Blocked);

        // Same status again is a no-op.
        let changed = apply_update(
            &mut roadmap,
            &json!({"task_status": {"id": "t1", "status": "blocked"}}),
        );
        assert!(!changed);
    }

    #[test]
    fn test_unknown_payload_is_no_change() {
        let mut roadmap = Roadmap::new();
        let version = roadmap.version;
        assert!(!apply_update(&mut roadmap, &json!({"unrelated": true})));
        assert_eq!(roadmap.version, version);
    }
}
