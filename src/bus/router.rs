//! Message router
//!
//! Owns the subscriber table, the reserved broadcast groups, the bounded
//! history buffer, and the delivery path. Delivery to a subscriber is an
//! unbounded channel push, so messages sent to one kind arrive at each
//! subscriber in send order. The recipient set for a broadcast is resolved
//! under a single lock acquisition: an agent unregistered after that snapshot
//! is not delivered to.
//!
//! Persistence failures are logged and swallowed; the bus prioritizes
//! liveness over durability.

use crate::bus::message::{HistoryFilter, Message, MessageKind, Target};
use crate::error::Result;
use crate::storage::{collections, DocumentStore};
use crate::types::AgentId;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Capacity of the wildcard observability channel
const WILDCARD_CAPACITY: usize = 256;

/// Bus traffic counters
#[derive(Debug, Clone)]
pub struct BusMetrics {
    pub total_messages: u64,
    pub messages_last_five_minutes: usize,
    pub per_kind: HashMap<MessageKind, u64>,
    pub registered_agents: usize,
}

#[derive(Default)]
struct RoutingTable {
    /// Message kind -> subscriber ids, in registration order
    subscriptions: HashMap<MessageKind, Vec<AgentId>>,
    /// Agent id -> delivery channel
    senders: HashMap<AgentId, mpsc::UnboundedSender<Message>>,
    /// Reserved broadcast group, maintained incrementally as user-compiler
    /// agents register and unregister
    compilers: BTreeSet<AgentId>,
}

#[derive(Default)]
struct Stats {
    total: u64,
    per_kind: HashMap<MessageKind, u64>,
    /// Send timestamps inside the metrics window, pruned on each send;
    /// independent of the history buffer so eviction there cannot
    /// undercount recent traffic
    recent: VecDeque<DateTime<Utc>>,
}

/// Typed publish/subscribe router
pub struct MessageBus {
    routes: RwLock<RoutingTable>,
    history: RwLock<VecDeque<Message>>,
    stats: RwLock<Stats>,
    store: Arc<dyn DocumentStore>,
    wildcard: broadcast::Sender<Message>,
    capacity: usize,
    /// Fixed `all_agents` group, captured at construction
    core_agents: Vec<AgentId>,
}

impl MessageBus {
    /// Create a bus with the given history capacity and fixed core-agent
    /// group
    pub fn new(store: Arc<dyn DocumentStore>, capacity: usize, core_agents: Vec<AgentId>) -> Self {
        let (wildcard, _) = broadcast::channel(WILDCARD_CAPACITY);
        Self {
            routes: RwLock::new(RoutingTable::default()),
            history: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            stats: RwLock::new(Stats::default()),
            store,
            wildcard,
            capacity,
            core_agents,
        }
    }

    /// Subscribe an agent to a set of message kinds
    ///
    /// Idempotent: registering the same id again replaces its delivery
    /// channel without duplicating subscriptions. User-compiler ids also
    /// join the reserved broadcast group.
    pub async fn register_agent(
        &self,
        id: AgentId,
        kinds: &[MessageKind],
        sender: mpsc::UnboundedSender<Message>,
    ) {
        let mut routes = self.routes.write().await;
        for kind in kinds {
            let subscribers = routes.subscriptions.entry(*kind).or_default();
            if !subscribers.contains(&id) {
                subscribers.push(id.clone());
            }
        }
        if id.is_user_compiler() {
            routes.compilers.insert(id.clone());
        }
        routes.senders.insert(id.clone(), sender);
        debug!(agent = %id, "Registered agent on bus");
    }

    /// Remove an agent from every subscriber set and broadcast group
    ///
    /// Dropping the delivery channel also terminates the agent's receive
    /// loop once it drains.
    pub async fn unregister_agent(&self, id: &AgentId) {
        let mut routes = self.routes.write().await;
        for subscribers in routes.subscriptions.values_mut() {
            subscribers.retain(|s| s != id);
        }
        routes.compilers.remove(id);
        routes.senders.remove(id);
        debug!(agent = %id, "Unregistered agent from bus");
    }

    /// Publish a message
    ///
    /// Assigns a correlation id if absent, persists the message, appends it
    /// to the bounded history, then delivers. Returns the correlation id.
    pub async fn send(&self, mut message: Message) -> Result<Uuid> {
        let correlation_id = *message
            .correlation_id
            .get_or_insert_with(Uuid::new_v4);

        // Durability is best-effort: a dead store must not block routing.
        if let Err(e) = self
            .store
            .set(
                collections::MESSAGES,
                &message.id.to_string(),
                serde_json::to_value(&message)?,
            )
            .await
        {
            warn!(error = %e, kind = %message.kind, "Failed to persist message, delivering anyway");
        }

        {
            let mut history = self.history.write().await;
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(message.clone());
        }

        {
            let mut stats = self.stats.write().await;
            stats.total += 1;
            *stats.per_kind.entry(message.kind).or_insert(0) += 1;
            let now = Utc::now();
            stats.recent.push_back(now);
            let cutoff = now - ChronoDuration::minutes(5);
            while stats.recent.front().map_or(false, |t| *t < cutoff) {
                stats.recent.pop_front();
            }
        }

        // Snapshot recipients under one lock acquisition so a broadcast is
        // atomic with respect to concurrent registration changes.
        let deliveries: Vec<(AgentId, mpsc::UnboundedSender<Message>, Message)> = {
            let routes = self.routes.read().await;
            match &message.target {
                Target::AllAgents => self
                    .core_agents
                    .iter()
                    .filter_map(|id| {
                        routes
                            .senders
                            .get(id)
                            .map(|tx| (id.clone(), tx.clone(), message.retargeted(id)))
                    })
                    .collect(),
                Target::AllUserCompilers => routes
                    .compilers
                    .iter()
                    .filter_map(|id| {
                        routes
                            .senders
                            .get(id)
                            .map(|tx| (id.clone(), tx.clone(), message.retargeted(id)))
                    })
                    .collect(),
                Target::Agent(_) => routes
                    .subscriptions
                    .get(&message.kind)
                    .map(|subscribers| {
                        subscribers
                            .iter()
                            .filter_map(|id| {
                                routes
                                    .senders
                                    .get(id)
                                    .map(|tx| (id.clone(), tx.clone(), message.clone()))
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            }
        };

        for (id, tx, copy) in deliveries {
            if tx.send(copy).is_err() {
                warn!(agent = %id, kind = %message.kind, "Subscriber channel closed, dropping delivery");
            }
        }

        // Observability tap; no receivers is fine.
        let _ = self.wildcard.send(message);

        Ok(correlation_id)
    }

    /// Buffered messages, optionally filtered
    pub async fn history(&self, filter: &HistoryFilter) -> Vec<Message> {
        let history = self.history.read().await;
        history.iter().filter(|m| filter.matches(m)).cloned().collect()
    }

    /// Traffic counters and subscriber-table size
    pub async fn metrics(&self) -> BusMetrics {
        let cutoff = Utc::now() - ChronoDuration::minutes(5);
        let stats = self.stats.read().await;
        let routes = self.routes.read().await;
        BusMetrics {
            total_messages: stats.total,
            messages_last_five_minutes: stats.recent.iter().filter(|t| **t >= cutoff).count(),
            per_kind: stats.per_kind.clone(),
            registered_agents: routes.senders.len(),
        }
    }

    /// Tap every message sent through the bus
    pub fn subscribe_wildcard(&self) -> broadcast::Receiver<Message> {
        self.wildcard.subscribe()
    }

    /// Currently-registered user-compiler agents
    pub async fn user_compilers(&self) -> Vec<AgentId> {
        let routes = self.routes.read().await;
        routes.compilers.iter().cloned().collect()
    }
}
