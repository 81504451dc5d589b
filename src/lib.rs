//! Agora - Hackathon Coordination Core
//!
//! A message-driven coordination system for hackathon events:
//! - Typed pub/sub message bus with bounded history and persistence
//! - Priority intake queue feeding a dual LLM processor pool
//! - Strategic decision engine with reactive and proactive drivers
//! - Elastic repository scanner pool with deep-dive aggregation
//! - Roadmap single-writer, progress tracking, per-user compiler agents
//!
//! # Architecture
//!
//! Everything communicates through the [`bus::MessageBus`]. External
//! transports submit user messages to the [`intake::CommunicationHub`] and
//! drain [`intake::OutboundResponse`]s; the [`agents::AgentManager`] wires
//! and supervises the rest.

pub mod agents;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod intake;
pub mod scanner;
pub mod services;
pub mod storage;
pub mod types;

pub use agents::{AgentManager, AgentStatus};
pub use bus::{Message, MessageBus, MessageKind, Target};
pub use config::AgoraConfig;
pub use error::{AgoraError, Result};
pub use intake::{CommunicationHub, OutboundResponse};
pub use storage::{DocumentStore, MemoryStore};
