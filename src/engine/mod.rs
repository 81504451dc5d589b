//! Strategic decision engine
//!
//! Two drivers share one task: reactively, each processed user message
//! triggers a system-state snapshot, a strategic LLM call, and execution of
//! the returned action list as follow-on bus messages; proactively, a 10s
//! tick re-reads the snapshot and applies threshold rules with no message
//! trigger. LLM failures are not retried here; the run loop logs and counts
//! them.

use crate::bus::{Message, MessageBus, MessageKind, Target};
use crate::error::Result;
use crate::health::ErrorTracker;
use crate::services::llm::{parse_json_response, CompletionProvider};
use crate::storage::{collections, DocumentStore};
use crate::types::{priority, AgentId, ProcessedMessage, ScanMode, SystemSnapshot};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Blocked-task count that triggers a blockage alert
const BLOCKED_TASK_THRESHOLD: usize = 2;
/// Completion rate below which reallocation is suggested
const LOW_COMPLETION_RATE: f32 = 0.30;
/// In-progress task count above which the low-completion rule applies
const HIGH_WIP_THRESHOLD: usize = 5;

/// Map a requested scanner count to a scanning strategy
pub fn mode_for_count(scanners: usize) -> ScanMode {
    match scanners {
        0 | 1 => ScanMode::Minimal,
        2..=3 => ScanMode::Targeted,
        4..=5 => ScanMode::Comprehensive,
        _ => ScanMode::DeepDive,
    }
}

/// One typed action from a strategic decision
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionAction {
    /// Notify an agent or a user
    Notify { target: String, message: String },
    /// Hand a task to a user
    Allocate { task: String, assignee: String },
    /// Bring users together on a topic
    Collaborate { users: Vec<String>, topic: String },
    /// Record a plan-level update
    Update { summary: String },
}

/// Scanner reallocation directive inside a decision
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceAllocation {
    pub scanners: usize,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

/// Parsed strategic LLM output
#[derive(Debug, Clone, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub actions: Vec<DecisionAction>,
    #[serde(default)]
    pub roadmap_update: Option<serde_json::Value>,
    #[serde(default)]
    pub resource_allocation: Option<ResourceAllocation>,
}

/// The decision-making agent
pub struct DecisionEngine {
    id: AgentId,
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn CompletionProvider>,
    strategy_model: String,
    errors: Arc<ErrorTracker>,
    tick: Duration,
}

impl DecisionEngine {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn DocumentStore>,
        llm: Arc<dyn CompletionProvider>,
        strategy_model: impl Into<String>,
        errors: Arc<ErrorTracker>,
        tick: Duration,
    ) -> Self {
        Self {
            id: AgentId::new("decision_engine"),
            bus,
            store,
            llm,
            strategy_model: strategy_model.into(),
            errors,
            tick,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Run reactive and proactive drivers until shutdown
    pub fn spawn(
        self,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.tick);
            info!(tick_secs = self.tick.as_secs(), "Decision engine started");

            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                if let Err(e) = self.handle_bus_message(message).await {
                                    warn!(error = %e, "Decision handling failed");
                                    self.errors.record();
                                }
                            }
                            None => break,
                        }
                    }
                    _ = timer.tick() => {
                        if let Err(e) = self.proactive_review().await {
                            warn!(error = %e, "Proactive review failed");
                            self.errors.record();
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Decision engine received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    async fn handle_bus_message(&self, message: Message) -> Result<()> {
        match message.kind {
            MessageKind::UserCommunication => {
                if !message.target.is_for(&self.id) {
                    return Ok(());
                }
                let processed: ProcessedMessage = serde_json::from_value(message.payload.clone())?;
                self.decide(&processed, &message).await
            }
            MessageKind::ScanResult => {
                // Scan results feed the snapshot indirectly; critical
                // findings get escalated immediately.
                self.escalate_critical_findings(&message).await
            }
            other => {
                debug!(kind = %other, "Decision engine ignoring bus message");
                Ok(())
            }
        }
    }

    /// Reactive path: snapshot, strategize, execute
    async fn decide(&self, processed: &ProcessedMessage, trigger: &Message) -> Result<()> {
        let snapshot = self.load_snapshot().await?;
        let decision = self.strategize(processed, &snapshot).await?;
        debug!(
            actions = decision.actions.len(),
            has_roadmap_update = decision.roadmap_update.is_some(),
            "Executing strategic decision"
        );
        self.execute(decision, trigger).await
    }

    async fn load_snapshot(&self) -> Result<SystemSnapshot> {
        let doc = self
            .store
            .get(collections::SYSTEM_STATE, "current")
            .await?;
        Ok(match doc {
            Some(value) => serde_json::from_value(value)?,
            None => SystemSnapshot::default(),
        })
    }

    async fn strategize(
        &self,
        processed: &ProcessedMessage,
        snapshot: &SystemSnapshot,
    ) -> Result<Decision> {
        let prompt = format!(
            r#"You are the strategic coordinator of a hackathon.

System state:
- Active users: {}
- Tasks in progress: {}
- Completion rate: {:.0}%
- Blocked tasks: {:?}
- Critical issues: {:?}

A participant message was classified:
- User: {} ({})
- Intent: {}
- Urgency: {:?}
- Entities: {:?}
- Content: {}

Decide what the coordination system should do next. Respond with JSON only:
{{"actions": [{{"type": "notify", "target": "<agent id or user id>", "message": "<text>"}} |
              {{"type": "allocate", "task": "<task>", "assignee": "<user id>"}} |
              {{"type": "collaborate", "users": ["<user id>"], "topic": "<topic>"}} |
              {{"type": "update", "summary": "<plan-level change>"}}],
 "roadmap_update": <optional object describing roadmap changes, or null>,
 "resource_allocation": <optional {{"scanners": <1-8>, "focus_areas": ["<area>"]}}, or null>}}
"#,
            snapshot.active_users,
            snapshot.tasks_in_progress,
            snapshot.completion_rate * 100.0,
            snapshot.blocked_tasks,
            snapshot.critical_issues,
            processed.message.user_name,
            processed.message.user_id,
            processed.intent,
            processed.urgency,
            processed.entities,
            processed.message.content,
        );

        let response = self.llm.complete(&prompt, &self.strategy_model).await?;
        parse_json_response(&response)
    }

    async fn execute(&self, decision: Decision, trigger: &Message) -> Result<()> {
        let correlation_id = trigger.correlation_id;

        for action in decision.actions {
            let message = match action {
                DecisionAction::Notify { target, message } => Message::new(
                    MessageKind::Notification,
                    self.id.clone(),
                    Target::from(target.clone()),
                    json!({ "user_id": target, "text": message }),
                    trigger.priority,
                ),
                DecisionAction::Allocate { task, assignee } => Message::new(
                    MessageKind::TaskAssignment,
                    self.id.clone(),
                    Target::Agent(AgentId::new("progress_coordinator")),
                    json!({ "task": task, "user_id": assignee }),
                    trigger.priority,
                ),
                DecisionAction::Collaborate { users, topic } => Message::new(
                    MessageKind::Notification,
                    self.id.clone(),
                    Target::AllUserCompilers,
                    json!({ "topic": topic, "users": users }),
                    trigger.priority,
                ),
                DecisionAction::Update { summary } => Message::new(
                    MessageKind::RoadmapUpdate,
                    self.id.clone(),
                    Target::Agent(AgentId::new("roadmap_orchestrator")),
                    json!({ "summary": summary }),
                    trigger.priority,
                ),
            };
            let message = match correlation_id {
                Some(id) => message.with_correlation(id),
                None => message,
            };
            self.bus.send(message).await?;
        }

        if let Some(update) = decision.roadmap_update {
            let message = Message::new(
                MessageKind::RoadmapUpdate,
                self.id.clone(),
                Target::Agent(AgentId::new("roadmap_orchestrator")),
                update,
                trigger.priority,
            );
            self.bus.send(message).await?;
        }

        if let Some(allocation) = decision.resource_allocation {
            self.send_allocation(allocation.scanners, allocation.focus_areas, trigger.priority)
                .await?;
        }

        Ok(())
    }

    async fn send_allocation(
        &self,
        scanners: usize,
        focus_areas: Vec<String>,
        message_priority: u8,
    ) -> Result<()> {
        let mode = mode_for_count(scanners);
        let message = Message::new(
            MessageKind::ScannerAllocation,
            self.id.clone(),
            Target::Agent(AgentId::new("scanner_manager")),
            json!({
                "scanners": scanners,
                "mode": mode,
                "focus_areas": focus_areas,
            }),
            message_priority,
        );
        self.bus.send(message).await?;
        Ok(())
    }

    /// Proactive path: threshold rules over the snapshot, no trigger message
    async fn proactive_review(&self) -> Result<()> {
        let snapshot = self.load_snapshot().await?;

        if snapshot.blocked_tasks.len() > BLOCKED_TASK_THRESHOLD {
            warn!(
                blocked = snapshot.blocked_tasks.len(),
                "Blockage threshold exceeded"
            );
            let alert = Message::new(
                MessageKind::SystemAlert,
                self.id.clone(),
                Target::Agent(AgentId::new("progress_coordinator")),
                json!({
                    "alert": "blockage",
                    "blocked_tasks": snapshot.blocked_tasks,
                }),
                priority::HIGH,
            );
            self.bus.send(alert).await?;
        }

        if snapshot.completion_rate < LOW_COMPLETION_RATE
            && snapshot.tasks_in_progress > HIGH_WIP_THRESHOLD
        {
            warn!(
                completion_rate = snapshot.completion_rate,
                in_progress = snapshot.tasks_in_progress,
                "Low completion with high WIP, suggesting reallocation"
            );
            let suggestion = Message::new(
                MessageKind::Notification,
                self.id.clone(),
                Target::Agent(AgentId::new("progress_coordinator")),
                json!({
                    "suggestion": "reallocate",
                    "completion_rate": snapshot.completion_rate,
                    "tasks_in_progress": snapshot.tasks_in_progress,
                }),
                priority::ELEVATED,
            );
            self.bus.send(suggestion).await?;
        }

        if !snapshot.critical_issues.is_empty() {
            warn!(
                issues = snapshot.critical_issues.len(),
                "Critical issues present, broadcasting escalation"
            );
            let escalation = Message::new(
                MessageKind::SystemAlert,
                self.id.clone(),
                Target::AllAgents,
                json!({
                    "alert": "critical_issues",
                    "issues": snapshot.critical_issues,
                }),
                priority::CRITICAL,
            );
            self.bus.send(escalation).await?;
        }

        Ok(())
    }

    async fn escalate_critical_findings(&self, message: &Message) -> Result<()> {
        let critical = message
            .payload
            .pointer("/aggregated/findings")
            .or_else(|| message.payload.get("reports"))
            .map(|v| {
                serde_json::to_string(v)
                    .map(|s| s.contains("\"critical\""))
                    .unwrap_or(false)
            })
            .unwrap_or(false);

        if critical {
            let alert = Message::new(
                MessageKind::SystemAlert,
                self.id.clone(),
                Target::AllAgents,
                json!({
                    "alert": "critical_scan_finding",
                    "scan_message_id": message.id,
                }),
                priority::CRITICAL,
            );
            self.bus.send(alert).await?;
        }
        Ok(())
    }
}
