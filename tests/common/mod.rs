//! Common test utilities and helpers

#![allow(dead_code)]

use agora_core::error::Result;
use agora_core::scanner::{RepositoryInspector, ScanDepth};
use agora_core::services::llm::CompletionProvider;
use agora_core::storage::MemoryStore;
use agora_core::types::{Finding, ScanMetrics, Urgency};
use agora_core::MessageBus;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Completion provider that answers each call site with a canned JSON body
pub struct ScriptedProvider {
    pub calls: AtomicUsize,
    pub urgency: &'static str,
    pub fail: bool,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            urgency: "low",
            fail: false,
        }
    }

    pub fn with_urgency(urgency: &'static str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            urgency,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            urgency: "low",
            fail: true,
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str, _model: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(agora_core::AgoraError::LlmApi(
                "scripted failure".to_string(),
            ));
        }
        if prompt.contains("Rate the urgency") {
            Ok(format!(r#"{{"urgency": "{}"}}"#, self.urgency))
        } else if prompt.contains("strategic coordinator") {
            Ok(r#"{"actions": [], "roadmap_update": null, "resource_allocation": null}"#
                .to_string())
        } else {
            Ok(r#"{"intent": "status_update", "entities": ["api"], "suggested_action": "acknowledge"}"#
                .to_string())
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Inspector returning a fixed finding set, for deterministic scan tests
pub struct FixedInspector {
    pub findings: Vec<Finding>,
}

impl FixedInspector {
    pub fn with_finding(severity: Urgency) -> Self {
        Self {
            findings: vec![Finding {
                kind: "complexity".to_string(),
                location: "src/server.rs:42".to_string(),
                detail: "deeply nested handler".to_string(),
                severity,
            }],
        }
    }
}

#[async_trait]
impl RepositoryInspector for FixedInspector {
    async fn inspect(
        &self,
        _focus_area: &str,
        _depth: ScanDepth,
    ) -> Result<(Vec<Finding>, ScanMetrics)> {
        Ok((
            self.findings.clone(),
            ScanMetrics {
                files_scanned: 10,
                avg_complexity: 4.0,
                coverage_pct: 80.0,
                scan_latency_ms: 5,
            },
        ))
    }
}

/// Bus over a fresh in-memory store with no core-agent broadcast group
pub fn test_bus() -> (Arc<MessageBus>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Arc::new(MessageBus::new(store.clone(), 256, vec![])), store)
}
