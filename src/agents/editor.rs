//! Edit coordination
//!
//! The [`EditCoordinator`] watches scan results for findings worth acting
//! on. High and critical findings become persisted notifications and a
//! bus notification to the hub, which forwards them to the affected users.

use crate::bus::{Message, MessageBus, MessageKind, Target};
use crate::error::Result;
use crate::health::ErrorTracker;
use crate::storage::{collections, DocumentStore};
use crate::types::{priority, AgentId, Finding, ScanReport, Urgency};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

pub struct EditCoordinator {
    id: AgentId,
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    errors: Arc<ErrorTracker>,
}

impl EditCoordinator {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn DocumentStore>,
        errors: Arc<ErrorTracker>,
    ) -> Self {
        Self {
            id: AgentId::new("edit_coordinator"),
            bus,
            store,
            errors,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn spawn(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Edit coordinator started");
            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                if let Err(e) = self.handle(message).await {
                                    warn!(error = %e, "Edit coordination failed");
                                    self.errors.record();
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Edit coordinator received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub async fn handle(&self, message: Message) -> Result<()> {
        if message.kind != MessageKind::ScanResult {
            debug!(kind = %message.kind, "Edit coordinator ignoring bus message");
            return Ok(());
        }

        let findings = extract_findings(&message.payload);
        let actionable: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.severity >= Urgency::High)
            .collect();
        if actionable.is_empty() {
            return Ok(());
        }

        info!(count = actionable.len(), "Actionable findings from scan");
        for finding in actionable {
            let key = format!("{}_{}", finding.kind, finding.location.replace('/', "_"));
            self.store
                .set(
                    collections::NOTIFICATIONS,
                    &key,
                    serde_json::to_value(finding)?,
                )
                .await?;

            let notification = Message::new(
                MessageKind::Notification,
                self.id.clone(),
                Target::Agent(AgentId::new("communication_hub")),
                json!({
                    "text": format!("{} at {}: {}", finding.kind, finding.location, finding.detail),
                    "severity": finding.severity,
                }),
                priority::HIGH,
            );
            let notification = match message.correlation_id {
                Some(id) => notification.with_correlation(id),
                None => notification,
            };
            self.bus.send(notification).await?;
        }
        Ok(())
    }
}

/// Findings from either a report list or an aggregated scan payload
fn extract_findings(payload: &serde_json::Value) -> Vec<Finding> {
    if let Some(aggregated) = payload.get("aggregated") {
        if let Some(findings) = aggregated.get("findings") {
            return serde_json::from_value(findings.clone()).unwrap_or_default();
        }
    }
    if let Some(reports) = payload.get("reports") {
        if let Ok(reports) = serde_json::from_value::<Vec<ScanReport>>(reports.clone()) {
            return reports.into_iter().flat_map(|r| r.findings).collect();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::HistoryFilter;
    use crate::storage::MemoryStore;
    use crate::types::ScanMetrics;
    use chrono::Utc;

    fn finding(severity: Urgency) -> Finding {
        Finding {
            kind: "vulnerability".to_string(),
            location: "src/auth.rs:10".to_string(),
            detail: "token not validated".to_string(),
            severity,
        }
    }

    #[tokio::test]
    async fn test_low_severity_findings_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MessageBus::new(store.clone(), 64, vec![]));
        let coordinator = EditCoordinator::new(bus.clone(), store, Arc::new(ErrorTracker::new()));

        let report = ScanReport {
            worker_id: "core".to_string(),
            mode: crate::types::ScanMode::Continuous,
            focus_area: "general".to_string(),
            findings: vec![finding(Urgency::Low)],
            metrics: ScanMetrics::default(),
            completed_at: Utc::now(),
        };
        coordinator
            .handle(Message::new(
                MessageKind::ScanResult,
                AgentId::new("scanner_manager"),
                Target::Agent(coordinator.id().clone()),
                json!({"reports": [report]}),
                priority::NORMAL,
            ))
            .await
            .unwrap();

        let sent = bus
            .history(&HistoryFilter {
                kind: Some(MessageKind::Notification),
                ..Default::default()
            })
            .await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn test_high_severity_finding_notifies_hub() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MessageBus::new(store.clone(), 64, vec![]));
        let coordinator =
            EditCoordinator::new(bus.clone(), store.clone(), Arc::new(ErrorTracker::new()));

        coordinator
            .handle(Message::new(
                MessageKind::ScanResult,
                AgentId::new("scanner_manager"),
                Target::Agent(coordinator.id().clone()),
                json!({"aggregated": {"findings": [finding(Urgency::Critical)]}}),
                priority::NORMAL,
            ))
            .await
            .unwrap();

        let sent = bus
            .history(&HistoryFilter {
                kind: Some(MessageKind::Notification),
                ..Default::default()
            })
            .await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].priority, priority::HIGH);
    }
}
