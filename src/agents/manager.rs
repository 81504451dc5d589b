//! System composition and lifecycle
//!
//! The [`AgentManager`] owns the wiring: it builds the bus with the fixed
//! core-agent broadcast group, registers every subscription, spawns the
//! agent tasks, and tears them down on shutdown. It also reacts to user
//! membership events by spawning and reaping per-user compiler agents.

use crate::bus::{Message, MessageBus, MessageKind, Target};
use crate::config::AgoraConfig;
use crate::engine::DecisionEngine;
use crate::error::Result;
use crate::health::{ErrorTracker, HealthMonitor};
use crate::intake::{CommunicationHub, MessageProcessor, OutboundResponse};
use crate::scanner::{RepositoryInspector, ScannerPool};
use crate::services::llm::CompletionProvider;
use crate::storage::DocumentStore;
use crate::types::{priority, AgentId};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// LLM providers by call site
///
/// Both intake processors share one provider; the strategy provider backs
/// the decision engine and is typically a stronger model.
pub struct LlmProviders {
    pub intake: Arc<dyn CompletionProvider>,
    pub strategy: Arc<dyn CompletionProvider>,
}

/// Point-in-time view of the running system
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub registered_agents: usize,
    pub active_compilers: Vec<String>,
    pub total_messages: u64,
    pub messages_last_five_minutes: usize,
}

/// Names of the permanent agents that receive `all_agents` broadcasts
fn core_agent_ids() -> Vec<AgentId> {
    [
        "communication_hub",
        "decision_engine",
        "scanner_manager",
        "roadmap_orchestrator",
        "progress_coordinator",
        "edit_coordinator",
        "code_extractor",
    ]
    .into_iter()
    .map(AgentId::new)
    .collect()
}

pub struct AgentManager {
    id: AgentId,
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    errors: Arc<ErrorTracker>,
    hub: Arc<CommunicationHub>,
    outbound_tx: mpsc::UnboundedSender<OutboundResponse>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    compilers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl AgentManager {
    /// Build and start the whole coordination system
    ///
    /// Returns the manager and the outbound-response stream the embedding
    /// transport drains.
    pub async fn start(
        config: AgoraConfig,
        providers: LlmProviders,
        inspector: Arc<dyn RepositoryInspector>,
        store: Arc<dyn DocumentStore>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<OutboundResponse>)> {
        let errors = Arc::new(ErrorTracker::new());
        let bus = Arc::new(MessageBus::new(
            store.clone(),
            config.bus.history_capacity,
            core_agent_ids(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let processors = [
            Arc::new(MessageProcessor::new(
                AgentId::new("processor_1"),
                providers.intake.clone(),
                config.llm.classification_model.clone(),
                config.llm.urgency_model.clone(),
                config.intake.max_pending,
            )),
            Arc::new(MessageProcessor::new(
                AgentId::new("processor_2"),
                providers.intake.clone(),
                config.llm.classification_model.clone(),
                config.llm.urgency_model.clone(),
                config.intake.max_pending,
            )),
        ];

        let hub = Arc::new(CommunicationHub::new(
            bus.clone(),
            store.clone(),
            processors,
            outbound_tx.clone(),
            errors.clone(),
            Duration::from_millis(config.intake.poll_interval_ms),
        ));

        let engine = DecisionEngine::new(
            bus.clone(),
            store.clone(),
            providers.strategy,
            config.llm.strategy_model.clone(),
            errors.clone(),
            Duration::from_secs(config.engine.tick_secs),
        );

        let scanner = Arc::new(ScannerPool::new(
            bus.clone(),
            store.clone(),
            inspector,
            config.scanner.max_workers,
            Duration::from_secs(config.scanner.temp_worker_ttl_secs),
        ));

        let roadmap = Arc::new(crate::agents::RoadmapOrchestrator::new(
            bus.clone(),
            store.clone(),
            errors.clone(),
            Duration::from_secs(config.roadmap.persist_interval_secs),
        ));
        let progress = Arc::new(crate::agents::ProgressCoordinator::new(
            store.clone(),
            errors.clone(),
        ));
        let editor = Arc::new(crate::agents::EditCoordinator::new(
            bus.clone(),
            store.clone(),
            errors.clone(),
        ));
        let extractor = Arc::new(crate::agents::CodeExtractor::new(
            store.clone(),
            errors.clone(),
        ));

        // Register subscriptions before any agent can publish, so early
        // traffic is never dropped for want of a route.
        let (hub_tx, hub_rx) = mpsc::unbounded_channel();
        bus.register_agent(hub.id().clone(), &[MessageKind::Notification], hub_tx)
            .await;

        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        bus.register_agent(
            engine.id().clone(),
            &[MessageKind::UserCommunication, MessageKind::ScanResult],
            engine_tx,
        )
        .await;

        let (scanner_tx, scanner_rx) = mpsc::unbounded_channel();
        bus.register_agent(
            scanner.id().clone(),
            &[MessageKind::ScannerAllocation, MessageKind::TargetedScan],
            scanner_tx,
        )
        .await;

        let (roadmap_tx, roadmap_rx) = mpsc::unbounded_channel();
        bus.register_agent(
            roadmap.id().clone(),
            &[MessageKind::RoadmapUpdate, MessageKind::UserRegistered],
            roadmap_tx,
        )
        .await;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        bus.register_agent(
            progress.id().clone(),
            &[
                MessageKind::TaskAssignment,
                MessageKind::UserCommunication,
                MessageKind::UserRegistered,
                MessageKind::UserDeparted,
            ],
            progress_tx,
        )
        .await;

        let (editor_tx, editor_rx) = mpsc::unbounded_channel();
        bus.register_agent(editor.id().clone(), &[MessageKind::ScanResult], editor_tx)
            .await;

        let (extractor_tx, extractor_rx) = mpsc::unbounded_channel();
        bus.register_agent(
            extractor.id().clone(),
            &[MessageKind::UserCommunication],
            extractor_tx,
        )
        .await;

        let (manager_tx, manager_rx) = mpsc::unbounded_channel();
        bus.register_agent(
            AgentId::new("agent_manager"),
            &[MessageKind::UserRegistered, MessageKind::UserDeparted],
            manager_tx,
        )
        .await;

        let monitor = HealthMonitor::new(
            bus.clone(),
            store.clone(),
            errors.clone(),
            Duration::from_secs(config.health.tick_secs),
            config.health.error_threshold,
        )
        .await;

        let mut tasks = Vec::new();
        tasks.push(hub.clone().spawn(hub_rx, shutdown_tx.subscribe()));
        tasks.push(engine.spawn(engine_rx, shutdown_tx.subscribe()));
        tasks.push(scanner.spawn(scanner_rx, shutdown_tx.subscribe()));
        tasks.push(roadmap.spawn(roadmap_rx, shutdown_tx.subscribe()));
        tasks.push(progress.spawn(progress_rx, shutdown_tx.subscribe()));
        tasks.push(editor.spawn(editor_rx, shutdown_tx.subscribe()));
        tasks.push(extractor.spawn(extractor_rx, shutdown_tx.subscribe()));
        tasks.push(monitor.spawn(shutdown_tx.subscribe()));

        let manager = Arc::new(Self {
            id: AgentId::new("agent_manager"),
            bus,
            store,
            errors,
            hub,
            outbound_tx,
            shutdown_tx: shutdown_tx.clone(),
            tasks: Mutex::new(tasks),
            compilers: Mutex::new(HashMap::new()),
        });

        let membership = manager
            .clone()
            .spawn_membership_loop(manager_rx, shutdown_tx.subscribe());
        manager.tasks.lock().await.push(membership);

        info!("Agent manager started all core agents");
        Ok((manager, outbound_rx))
    }

    /// The intake hub, for embedding transports that submit user messages
    pub fn hub(&self) -> Arc<CommunicationHub> {
        self.hub.clone()
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn errors(&self) -> Arc<ErrorTracker> {
        self.errors.clone()
    }

    /// Announce a user joining; compiler spawn and onboarding follow from
    /// the broadcast
    pub async fn register_user(&self, user_id: &str) -> Result<()> {
        let message = Message::new(
            MessageKind::UserRegistered,
            self.id.clone(),
            Target::Agent(self.id.clone()),
            serde_json::json!({ "user_id": user_id }),
            priority::NORMAL,
        );
        self.bus.send(message).await?;
        Ok(())
    }

    /// Announce a user leaving
    pub async fn deregister_user(&self, user_id: &str) -> Result<()> {
        let message = Message::new(
            MessageKind::UserDeparted,
            self.id.clone(),
            Target::Agent(self.id.clone()),
            serde_json::json!({ "user_id": user_id }),
            priority::NORMAL,
        );
        self.bus.send(message).await?;
        Ok(())
    }

    fn spawn_membership_loop(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                let user_id = message
                                    .payload
                                    .get("user_id")
                                    .and_then(Value::as_str)
                                    .map(str::to_string);
                                let Some(user_id) = user_id else { continue };
                                match message.kind {
                                    MessageKind::UserRegistered => {
                                        self.spawn_compiler(&user_id).await;
                                    }
                                    MessageKind::UserDeparted => {
                                        self.reap_compiler(&user_id).await;
                                    }
                                    _ => {}
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }

    async fn spawn_compiler(&self, user_id: &str) {
        let mut compilers = self.compilers.lock().await;
        if compilers.contains_key(user_id) {
            return;
        }

        let compiler = Arc::new(crate::agents::UserCompiler::new(
            user_id,
            self.store.clone(),
            self.outbound_tx.clone(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        self.bus
            .register_agent(
                compiler.id().clone(),
                &[
                    MessageKind::RoadmapUpdate,
                    MessageKind::Notification,
                    MessageKind::SystemAlert,
                ],
                tx,
            )
            .await;
        info!(user_id, "Spawned user compiler");
        compilers.insert(user_id.to_string(), compiler.spawn(rx));
    }

    async fn reap_compiler(&self, user_id: &str) {
        let handle = self.compilers.lock().await.remove(user_id);
        if let Some(handle) = handle {
            // Unregistration drops the bus-side sender; the compiler task
            // drains its channel and exits on its own.
            self.bus
                .unregister_agent(&AgentId::user_compiler(user_id))
                .await;
            if let Err(e) = handle.await {
                warn!(user_id, error = %e, "Compiler task ended abnormally");
            }
            info!(user_id, "Reaped user compiler");
        }
    }

    pub async fn status(&self) -> AgentStatus {
        let metrics = self.bus.metrics().await;
        let active_compilers = self
            .bus
            .user_compilers()
            .await
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect();
        AgentStatus {
            registered_agents: metrics.registered_agents,
            active_compilers,
            total_messages: metrics.total_messages,
            messages_last_five_minutes: metrics.messages_last_five_minutes,
        }
    }

    /// Stop every agent task and wait for them to finish
    pub async fn shutdown(&self) {
        info!("Shutting down agent manager");
        let _ = self.shutdown_tx.send(());

        let compilers: Vec<String> = self.compilers.lock().await.keys().cloned().collect();
        for user_id in compilers {
            self.reap_compiler(&user_id).await;
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Agent task ended abnormally");
            }
        }
        info!("Agent manager stopped");
    }
}
