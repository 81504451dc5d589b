//! User message intake pipeline
//!
//! External transports hand messages to the [`CommunicationHub`], which
//! enqueues them on a max-priority queue under a cheap keyword heuristic.
//! A short-interval poller drains the queue into one of two symmetric
//! [`MessageProcessor`]s for LLM intent and urgency classification; the
//! result is published on the bus for the decision engine and echoed back to
//! the transport as an outbound response.

pub mod hub;
pub mod processor;
pub mod queue;

pub use hub::{intake_priority, CommunicationHub, OutboundResponse};
pub use processor::MessageProcessor;
pub use queue::PriorityIntakeQueue;
