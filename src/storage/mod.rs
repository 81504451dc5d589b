//! Storage layer for the Agora coordination core
//!
//! Provides the document-store abstraction the core persists through:
//! messages, processed messages, roadmaps, scan results, alerts, and the
//! system-state snapshot. The production backend is an external collaborator;
//! this crate ships an in-memory implementation used by the binary and tests.

pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryStore;

/// Collection names written by the core
pub mod collections {
    pub const MESSAGES: &str = "messages";
    pub const PROCESSED_MESSAGES: &str = "processed_messages";
    pub const ROADMAPS: &str = "roadmaps";
    pub const SCAN_RESULTS: &str = "scan_results";
    pub const ALERTS: &str = "alerts";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const SYSTEM_STATE: &str = "system_state";
    pub const SNIPPETS: &str = "snippets";
    pub const TASKS: &str = "tasks";
}

/// Document store trait mirroring the collaborator contract
/// (`collection(name).doc(id).get/set/update`, batch writes)
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, or `None` if absent
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Create or replace a document
    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()>;

    /// Shallow-merge a patch into an existing document; creates the document
    /// if it does not exist
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()>;

    /// List all documents in a collection
    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>>;

    /// Write several documents to one collection atomically
    async fn batch_set(&self, collection: &str, entries: Vec<(String, Value)>) -> Result<()>;
}
