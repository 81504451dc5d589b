//! Progress tracking
//!
//! The [`ProgressCoordinator`] folds task assignments, classified user
//! traffic, and membership events into per-user task documents and the
//! shared [`SystemSnapshot`] the decision engine reads. The snapshot is
//! rewritten after every handled event, so readers are at most one event
//! behind.

use crate::bus::{Message, MessageKind};
use crate::error::Result;
use crate::health::ErrorTracker;
use crate::storage::{collections, DocumentStore};
use crate::types::{AgentId, ProcessedMessage, SystemSnapshot, TaskStatus, Urgency};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

/// Recent critical issues kept in the snapshot
const MAX_CRITICAL_ISSUES: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrackedTask {
    task: String,
    status: TaskStatus,
    assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserProgress {
    user_id: String,
    tasks: Vec<TrackedTask>,
    blocked: bool,
    last_activity: DateTime<Utc>,
}

impl UserProgress {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            tasks: Vec::new(),
            blocked: false,
            last_activity: Utc::now(),
        }
    }
}

pub struct ProgressCoordinator {
    id: AgentId,
    store: Arc<dyn DocumentStore>,
    errors: Arc<ErrorTracker>,
    users: Mutex<HashMap<String, UserProgress>>,
    critical_issues: Mutex<Vec<String>>,
}

impl ProgressCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, errors: Arc<ErrorTracker>) -> Self {
        Self {
            id: AgentId::new("progress_coordinator"),
            store,
            errors,
            users: Mutex::new(HashMap::new()),
            critical_issues: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn spawn(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Progress coordinator started");
            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                if let Err(e) = self.handle(message).await {
                                    warn!(error = %e, "Progress update failed");
                                    self.errors.record();
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Progress coordinator received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub async fn handle(&self, message: Message) -> Result<()> {
        match message.kind {
            MessageKind::TaskAssignment => self.assign_task(&message.payload).await,
            MessageKind::UserCommunication => self.record_activity(&message.payload).await,
            MessageKind::UserRegistered => {
                let user_id = payload_user_id(&message.payload);
                if let Some(user_id) = user_id {
                    self.users
                        .lock()
                        .await
                        .entry(user_id.clone())
                        .or_insert_with(|| UserProgress::new(&user_id));
                    self.persist_user(&user_id).await?;
                    self.write_snapshot().await?;
                }
                Ok(())
            }
            MessageKind::UserDeparted => {
                if let Some(user_id) = payload_user_id(&message.payload) {
                    self.users.lock().await.remove(&user_id);
                    self.write_snapshot().await?;
                }
                Ok(())
            }
            other => {
                debug!(kind = %other, "Progress coordinator ignoring bus message");
                Ok(())
            }
        }
    }

    async fn assign_task(&self, payload: &Value) -> Result<()> {
        let user_id = match payload_user_id(payload) {
            Some(id) => id,
            None => return Ok(()),
        };
        let task = payload
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or("untitled")
            .to_string();

        {
            let mut users = self.users.lock().await;
            let progress = users
                .entry(user_id.clone())
                .or_insert_with(|| UserProgress::new(&user_id));
            progress.tasks.push(TrackedTask {
                task: task.clone(),
                status: TaskStatus::InProgress,
                assigned_at: Utc::now(),
            });
            progress.last_activity = Utc::now();
        }

        debug!(user_id, task, "Task assigned");
        self.persist_user(&user_id).await?;
        self.write_snapshot().await
    }

    async fn record_activity(&self, payload: &Value) -> Result<()> {
        let processed: ProcessedMessage = match serde_json::from_value(payload.clone()) {
            Ok(p) => p,
            // Not every UserCommunication payload is a processed record.
            Err(_) => return Ok(()),
        };
        let user_id = processed.message.user_id.clone();

        let blocked = processed
            .message
            .context
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s == "blocked")
            .unwrap_or(false)
            || processed.intent.to_lowercase().contains("block");
        let done = processed.intent.to_lowercase().contains("complet");

        {
            let mut users = self.users.lock().await;
            let progress = users
                .entry(user_id.clone())
                .or_insert_with(|| UserProgress::new(&user_id));
            progress.last_activity = Utc::now();
            progress.blocked = blocked;
            if blocked {
                if let Some(task) = progress
                    .tasks
                    .iter_mut()
                    .rev()
                    .find(|t| t.status == TaskStatus::InProgress)
                {
                    task.status = TaskStatus::Blocked;
                }
            } else if done {
                if let Some(task) = progress
                    .tasks
                    .iter_mut()
                    .rev()
                    .find(|t| t.status != TaskStatus::Done)
                {
                    task.status = TaskStatus::Done;
                }
            } else {
                // Any non-blocked activity unblocks earlier tasks.
                for task in &mut progress.tasks {
                    if task.status == TaskStatus::Blocked {
                        task.status = TaskStatus::InProgress;
                    }
                }
            }
        }

        if processed.urgency == Urgency::Critical {
            let mut issues = self.critical_issues.lock().await;
            issues.push(format!("{}: {}", user_id, processed.intent));
            let overflow = issues.len().saturating_sub(MAX_CRITICAL_ISSUES);
            issues.drain(..overflow);
        }

        self.persist_user(&user_id).await?;
        self.write_snapshot().await
    }

    async fn persist_user(&self, user_id: &str) -> Result<()> {
        let doc = {
            let users = self.users.lock().await;
            match users.get(user_id) {
                Some(progress) => serde_json::to_value(progress)?,
                None => return Ok(()),
            }
        };
        self.store.set(collections::TASKS, user_id, doc).await
    }

    /// Rebuild and persist the shared system snapshot
    pub async fn write_snapshot(&self) -> Result<()> {
        let snapshot = self.snapshot().await;
        self.store
            .set(
                collections::SYSTEM_STATE,
                "current",
                serde_json::to_value(&snapshot)?,
            )
            .await
    }

    pub async fn snapshot(&self) -> SystemSnapshot {
        let users = self.users.lock().await;
        let mut total = 0usize;
        let mut done = 0usize;
        let mut in_progress = 0usize;
        let mut blocked_tasks = Vec::new();

        for progress in users.values() {
            for task in &progress.tasks {
                total += 1;
                match task.status {
                    TaskStatus::Done => done += 1,
                    TaskStatus::InProgress => in_progress += 1,
                    TaskStatus::Blocked => blocked_tasks.push(task.task.clone()),
                    TaskStatus::Todo => {}
                }
            }
        }

        let completion_rate = if total == 0 {
            0.0
        } else {
            done as f32 / total as f32
        };

        SystemSnapshot {
            active_users: users.len(),
            tasks_in_progress: in_progress,
            completion_rate,
            blocked_tasks,
            critical_issues: self.critical_issues.lock().await.clone(),
            captured_at: Some(Utc::now()),
        }
    }
}

fn payload_user_id(payload: &Value) -> Option<String> {
    payload
        .get("user_id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::UserMessage;
    use serde_json::json;

    fn coordinator() -> ProgressCoordinator {
        let store = Arc::new(MemoryStore::new());
        ProgressCoordinator::new(store, Arc::new(ErrorTracker::new()))
    }

    fn processed(user_id: &str, intent: &str, urgency: Urgency) -> Value {
        serde_json::to_value(ProcessedMessage {
            message: UserMessage::new(user_id, "Test User", "hello", json!({})),
            intent: intent.to_string(),
            entities: vec![],
            urgency,
            suggested_action: String::new(),
            agent_id: AgentId::new("processor_1"),
            processed_at: Utc::now(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_assignment_and_blockage_flow_into_snapshot() {
        let coordinator = coordinator();
        coordinator
            .assign_task(&json!({"user_id": "u1", "task": "build auth"}))
            .await
            .unwrap();
        coordinator
            .record_activity(&processed("u1", "report_blocker", Urgency::High))
            .await
            .unwrap();

        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.active_users, 1);
        assert_eq!(snapshot.blocked_tasks, vec!["build auth".to_string()]);
        assert_eq!(snapshot.tasks_in_progress, 0);
    }

    #[tokio::test]
    async fn test_completion_rate() {
        let coordinator = coordinator();
        coordinator
            .assign_task(&json!({"user_id": "u1", "task": "a"}))
            .await
            .unwrap();
        coordinator
            .assign_task(&json!({"user_id": "u1", "task": "b"}))
            .await
            .unwrap();
        coordinator
            .record_activity(&processed("u1", "completed the feature", Urgency::Low))
            .await
            .unwrap();

        let snapshot = coordinator.snapshot().await;
        assert!((snapshot.completion_rate - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_critical_issue_capture_and_departure() {
        let coordinator = coordinator();
        coordinator
            .record_activity(&processed("u2", "production outage", Urgency::Critical))
            .await
            .unwrap();
        let snapshot = coordinator.snapshot().await;
        assert_eq!(snapshot.critical_issues.len(), 1);

        coordinator
            .handle(Message::new(
                MessageKind::UserDeparted,
                AgentId::new("agent_manager"),
                crate::bus::Target::Agent(coordinator.id().clone()),
                json!({"user_id": "u2"}),
                crate::types::priority::NORMAL,
            ))
            .await
            .unwrap();
        assert_eq!(coordinator.snapshot().await.active_users, 0);
    }
}
