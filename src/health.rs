//! Health monitoring and error-storm suppression
//!
//! Components report handled errors to a shared [`ErrorTracker`]. The
//! [`HealthMonitor`] ticks every 30 seconds, loads recent bus history on
//! startup, persists degraded snapshots, and converts an error storm
//! (more than 50 recent errors) into exactly one critical alert before
//! resetting the counter, to avoid alert-fatigue amplification.

use crate::bus::{HistoryFilter, Message, MessageBus, MessageKind, Target};
use crate::error::Result;
use crate::storage::{collections, DocumentStore};
use crate::types::{priority, AgentId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Rolling window for the error counter
const ERROR_WINDOW: Duration = Duration::from_secs(300);

/// Shared rolling counter of handled errors
#[derive(Default)]
pub struct ErrorTracker {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one handled error
    pub fn record(&self) {
        // Called from sync contexts; blocking_lock is unsuitable on the
        // runtime, so use try_lock and accept a rare dropped sample under
        // contention.
        if let Ok(mut timestamps) = self.timestamps.try_lock() {
            timestamps.push_back(Instant::now());
        }
    }

    /// Errors recorded inside the rolling window
    pub async fn recent(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        let cutoff = Instant::now() - ERROR_WINDOW;
        while timestamps.front().map(|t| *t < cutoff).unwrap_or(false) {
            timestamps.pop_front();
        }
        timestamps.len()
    }

    /// Reset after an alert so one storm produces one alert
    pub async fn reset(&self) {
        self.timestamps.lock().await.clear();
    }
}

/// Health status of the coordination core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Pass,
    Warn,
    Fail,
}

/// Snapshot persisted when the system is degraded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub recent_errors: usize,
    pub bus_messages_last_five_minutes: usize,
    pub registered_agents: usize,
    pub captured_at: chrono::DateTime<Utc>,
}

/// Periodic health monitor
pub struct HealthMonitor {
    id: AgentId,
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    errors: Arc<ErrorTracker>,
    tick: Duration,
    error_threshold: usize,
    /// Recent bus history loaded at startup
    startup_history: Vec<Message>,
}

impl HealthMonitor {
    pub async fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn DocumentStore>,
        errors: Arc<ErrorTracker>,
        tick: Duration,
        error_threshold: usize,
    ) -> Self {
        // Warm the monitor with whatever traffic the bus has already seen.
        let startup_history = bus.history(&HistoryFilter::default()).await;
        debug!(
            messages = startup_history.len(),
            "Health monitor loaded recent history"
        );
        Self {
            id: AgentId::new("health_monitor"),
            bus,
            store,
            errors,
            tick,
            error_threshold,
            startup_history,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Run the monitor loop until shutdown
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.tick);
            info!(
                tick_secs = self.tick.as_secs(),
                preloaded = self.startup_history.len(),
                "Health monitor started"
            );

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.check().await {
                            warn!(error = %e, "Health check failed");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Health monitor received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    async fn check(&self) -> Result<()> {
        let recent_errors = self.errors.recent().await;
        let metrics = self.bus.metrics().await;

        let status = if recent_errors > self.error_threshold {
            HealthStatus::Fail
        } else if recent_errors > self.error_threshold / 2 {
            HealthStatus::Warn
        } else {
            HealthStatus::Pass
        };

        if recent_errors > self.error_threshold {
            warn!(recent_errors, "Error storm detected, raising critical alert");
            let alert = Message::new(
                MessageKind::SystemAlert,
                self.id.clone(),
                Target::AllAgents,
                json!({
                    "alert": "error_storm",
                    "recent_errors": recent_errors,
                    "window_secs": ERROR_WINDOW.as_secs(),
                }),
                priority::CRITICAL,
            );
            self.bus.send(alert).await?;
            // One storm, one alert.
            self.errors.reset().await;
        }

        if status != HealthStatus::Pass {
            let snapshot = HealthSnapshot {
                status,
                recent_errors,
                bus_messages_last_five_minutes: metrics.messages_last_five_minutes,
                registered_agents: metrics.registered_agents,
                captured_at: Utc::now(),
            };
            self.store
                .set(
                    collections::ALERTS,
                    &format!("health_{}", snapshot.captured_at.timestamp()),
                    serde_json::to_value(&snapshot)?,
                )
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_error_tracker_counts_and_resets() {
        let tracker = ErrorTracker::new();
        for _ in 0..7 {
            tracker.record();
        }
        assert_eq!(tracker.recent().await, 7);

        tracker.reset().await;
        assert_eq!(tracker.recent().await, 0);
    }

    #[tokio::test]
    async fn test_error_storm_emits_single_alert_and_resets() {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MessageBus::new(store.clone(), 64, vec![]));
        let errors = Arc::new(ErrorTracker::new());
        for _ in 0..51 {
            errors.record();
        }

        let monitor = HealthMonitor::new(
            bus.clone(),
            store,
            errors.clone(),
            Duration::from_secs(30),
            50,
        )
        .await;
        monitor.check().await.unwrap();

        let alerts = bus
            .history(&HistoryFilter {
                kind: Some(MessageKind::SystemAlert),
                ..Default::default()
            })
            .await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].priority, priority::CRITICAL);
        assert_eq!(errors.recent().await, 0, "counter reset after the alert");
    }
}
