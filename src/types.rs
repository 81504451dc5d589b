//! Core data types for the Agora coordination core
//!
//! This module defines the fundamental data structures shared across the
//! message bus, intake pipeline, decision engine, and scanner pool: agent
//! identities, user messages, the roadmap aggregate, scan reports, and the
//! system-state snapshot consumed by strategic decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix for per-user compiler agent identities
pub const USER_COMPILER_PREFIX: &str = "user_compiler_";

/// Unique identifier for agents on the message bus
///
/// Wraps a string id to prevent mixing agent identities with other string
/// data. Per-user compiler agents follow the `user_compiler_<id>` naming
/// convention and are recognized by the bus for group broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the compiler agent id for a user
    pub fn user_compiler(user_id: &str) -> Self {
        Self(format!("{}{}", USER_COMPILER_PREFIX, user_id))
    }

    /// Check whether this id follows the user-compiler naming convention
    pub fn is_user_compiler(&self) -> bool {
        self.0.starts_with(USER_COMPILER_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message priority scale, used uniformly across the intake queue and the bus
///
/// Higher value = more urgent.
pub mod priority {
    pub const LOW: u8 = 1;
    pub const NORMAL: u8 = 2;
    pub const ELEVATED: u8 = 3;
    pub const HIGH: u8 = 4;
    pub const CRITICAL: u8 = 5;
}

/// LLM-derived urgency classification of a processed user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    /// Map urgency onto the bus priority scale
    pub fn as_priority(self) -> u8 {
        match self {
            Urgency::Low => priority::NORMAL,
            Urgency::Medium => priority::ELEVATED,
            Urgency::High => priority::HIGH,
            Urgency::Critical => priority::CRITICAL,
        }
    }
}

/// Lifecycle status of an intake message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processed,
    Failed,
}

/// A user message awaiting classification in the intake queue
///
/// Created at ingestion, consumed exactly once by a processor, never
/// re-enqueued after a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: Uuid,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    /// Arbitrary context snapshot: current tasks, user status
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl UserMessage {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        content: impl Into<String>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            content: content.into(),
            context,
            timestamp: Utc::now(),
            status: MessageStatus::Pending,
        }
    }
}

/// Output of a message processor: the original message plus extracted intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message: UserMessage,
    pub intent: String,
    pub entities: Vec<String>,
    pub urgency: Urgency,
    pub suggested_action: String,
    /// Which processor handled the message
    pub agent_id: AgentId,
    pub processed_at: DateTime<Utc>,
}

/// Status of a roadmap task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
}

/// A single task inside a roadmap phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadmapTask {
    pub id: String,
    pub title: String,
    pub assignee: Option<String>,
    pub status: TaskStatus,
}

/// A roadmap phase grouping related tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub tasks: Vec<RoadmapTask>,
}

/// A project milestone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    pub due: Option<DateTime<Utc>>,
    pub reached: bool,
}

/// The plan-of-record for the hackathon project
///
/// Single-writer aggregate owned by the RoadmapOrchestrator; `version` is
/// incremented on every structural change and the whole document is
/// persisted wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roadmap {
    pub version: u64,
    pub phases: Vec<Phase>,
    pub milestones: Vec<Milestone>,
    pub integration_points: Vec<String>,
    pub risk_mitigation: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Roadmap {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            phases: vec![Phase {
                name: "Kickoff".to_string(),
                tasks: Vec::new(),
            }],
            milestones: Vec::new(),
            integration_points: Vec::new(),
            risk_mitigation: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }

    /// Record a structural change: bump the version and the update timestamp
    pub fn touch(&mut self) {
        self.version += 1;
        self.last_updated = Utc::now();
    }
}

impl Default for Roadmap {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan-depth strategy a scanner worker runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    Continuous,
    Targeted,
    Minimal,
    Comprehensive,
    DeepDive,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanMode::Continuous => "continuous",
            ScanMode::Targeted => "targeted",
            ScanMode::Minimal => "minimal",
            ScanMode::Comprehensive => "comprehensive",
            ScanMode::DeepDive => "deep_dive",
        };
        write!(f, "{}", s)
    }
}

/// A single repository finding reported by a scanner worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Finding category, e.g. "complexity", "todo", "vulnerability"
    pub kind: String,
    /// File path or path:line locator
    pub location: String,
    pub detail: String,
    pub severity: Urgency,
}

/// Quantitative metrics from one scan pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub files_scanned: usize,
    pub avg_complexity: f32,
    pub coverage_pct: f32,
    pub scan_latency_ms: u64,
}

/// Result of a single worker's scan pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub worker_id: String,
    pub mode: ScanMode,
    pub focus_area: String,
    pub findings: Vec<Finding>,
    pub metrics: ScanMetrics,
    pub completed_at: DateTime<Utc>,
}

/// Deduplicated cross-worker aggregation produced by deep-dive scans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedScan {
    pub findings: Vec<Finding>,
    pub metrics: ScanMetrics,
    /// Rule-based repository health score, 0-100
    pub health_score: u8,
    pub worker_count: usize,
}

/// Point-in-time view of overall system state
///
/// Written by the ProgressCoordinator, read by the DecisionEngine. Reads are
/// only eventually consistent with respect to in-flight updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub active_users: usize,
    pub tasks_in_progress: usize,
    /// Fraction of known tasks completed, 0.0-1.0
    pub completion_rate: f32,
    pub blocked_tasks: Vec<String>,
    pub critical_issues: Vec<String>,
    pub captured_at: Option<DateTime<Utc>>,
}
