//! Bus message types
//!
//! The message catalog is a closed enum so every subscriber dispatches
//! through one exhaustive `match` instead of subscribing by string tag.

use crate::types::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed catalog of bus message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Processed user message routed to the decision engine
    UserCommunication,
    /// Scanner pool resize + strategy directive
    ScannerAllocation,
    /// On-demand scan of a focus area
    TargetedScan,
    /// Findings reported by the scanner pool
    ScanResult,
    /// Roadmap mutation request, or roadmap broadcast to compilers
    RoadmapUpdate,
    /// Task handed to a user
    TaskAssignment,
    /// A user joined the event
    UserRegistered,
    /// A user left the event
    UserDeparted,
    /// User-facing or agent-facing notification
    Notification,
    /// Health monitor / escalation alert
    SystemAlert,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageKind::UserCommunication => "user_communication",
            MessageKind::ScannerAllocation => "scanner_allocation",
            MessageKind::TargetedScan => "targeted_scan",
            MessageKind::ScanResult => "scan_result",
            MessageKind::RoadmapUpdate => "roadmap_update",
            MessageKind::TaskAssignment => "task_assignment",
            MessageKind::UserRegistered => "user_registered",
            MessageKind::UserDeparted => "user_departed",
            MessageKind::Notification => "notification",
            MessageKind::SystemAlert => "system_alert",
        };
        write!(f, "{}", s)
    }
}

/// Delivery target of a message
///
/// Serialized as a plain string on the wire: an agent id, `all_agents`,
/// or `all_user_compilers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Target {
    Agent(AgentId),
    AllAgents,
    AllUserCompilers,
}

impl Target {
    /// Whether a directly-addressed message concerns the given agent
    pub fn is_for(&self, id: &AgentId) -> bool {
        match self {
            Target::Agent(target) => target == id,
            Target::AllAgents => true,
            Target::AllUserCompilers => id.is_user_compiler(),
        }
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        match target {
            Target::Agent(id) => id.as_str().to_string(),
            Target::AllAgents => "all_agents".to_string(),
            Target::AllUserCompilers => "all_user_compilers".to_string(),
        }
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        match s.as_str() {
            "all_agents" => Target::AllAgents,
            "all_user_compilers" => Target::AllUserCompilers,
            _ => Target::Agent(AgentId::new(s)),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(self.clone()))
    }
}

/// The unit of bus traffic
///
/// Never mutated after creation; group broadcasts deliver shallow copies
/// with a rewritten `target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub kind: MessageKind,
    pub source: AgentId,
    pub target: Target,
    /// Opaque structured payload, collaborator-defined shape
    pub payload: Value,
    /// Bus priority, higher = more urgent
    pub priority: u8,
    pub timestamp: DateTime<Utc>,
    /// Assigned by the bus on send if absent
    pub correlation_id: Option<Uuid>,
}

impl Message {
    pub fn new(
        kind: MessageKind,
        source: AgentId,
        target: Target,
        payload: Value,
        priority: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source,
            target,
            payload,
            priority,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Link this message to an existing request/response exchange
    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Copy for group delivery with the target rewritten to one recipient
    pub(crate) fn retargeted(&self, recipient: &AgentId) -> Self {
        let mut copy = self.clone();
        copy.target = Target::Agent(recipient.clone());
        copy
    }
}

/// Optional filters over the bus history buffer
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<MessageKind>,
    pub source: Option<AgentId>,
    pub target: Option<Target>,
    pub since: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub(crate) fn matches(&self, message: &Message) -> bool {
        if let Some(kind) = self.kind {
            if message.kind != kind {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if &message.source != source {
                return false;
            }
        }
        if let Some(ref target) = self.target {
            if &message.target != target {
                return false;
            }
        }
        if let Some(since) = self.since {
            if message.timestamp < since {
                return false;
            }
        }
        true
    }
}
