//! In-memory document store
//!
//! Backs the document-store contract with nested hash maps behind an async
//! RwLock. Suitable for the demo binary and tests; durability belongs to the
//! external collaborator backend.

use crate::error::Result;
use crate::storage::DocumentStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory document store
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, HashMap<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (test/diagnostic helper)
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let doc = docs.entry(id.to_string()).or_insert(Value::Null);

        match (doc, patch) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (key, value) in incoming {
                    existing.insert(key, value);
                }
            }
            (slot, patch) => *slot = patch,
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, value)| (id.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn batch_set(&self, collection: &str, entries: Vec<(String, Value)>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        for (id, value) in entries {
            docs.insert(id, value);
        }
        Ok(())
    }
}
