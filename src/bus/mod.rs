//! Typed in-process message bus
//!
//! The bus is the only coupling between agents: producers publish
//! [`Message`]s, the router persists them, appends them to a bounded history,
//! and fans them out to subscriber channels. Dispatch is by message kind;
//! `target` is filtering metadata that subscribers sharing a kind must check
//! themselves. Two reserved broadcast groups exist: the fixed core-agent
//! group (`all_agents`) and the dynamic user-compiler group
//! (`all_user_compilers`).

pub mod message;
pub mod router;

pub use message::{HistoryFilter, Message, MessageKind, Target};
pub use router::{BusMetrics, MessageBus};
