//! Elastic repository scanner pool
//!
//! One permanent `core` worker always exists; allocation directives from the
//! decision engine grow and shrink an ephemeral remainder between 1 and 8
//! workers. Five strategies differ in scan depth and in whether workers run
//! sequentially (core-only for minimal) or fan out across the whole pool;
//! deep-dive additionally deduplicates findings across workers and computes
//! a rule-based health score.

pub mod worker;

use crate::bus::{Message, MessageBus, MessageKind, Target};
use crate::error::{AgoraError, Result};
use crate::storage::{collections, DocumentStore};
use crate::types::{AggregatedScan, AgentId, Finding, ScanMetrics, ScanMode, ScanReport};
use chrono::Utc;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub use worker::{OfflineInspector, RepositoryInspector, ScanDepth, ScannerWorker, CORE_WORKER};

/// Outcome of one scanning strategy run
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Reports(Vec<ScanReport>),
    Aggregated(AggregatedScan),
}

/// Elastic pool of scanner workers
pub struct ScannerPool {
    id: AgentId,
    workers: Arc<RwLock<HashMap<String, ScannerWorker>>>,
    inspector: Arc<dyn RepositoryInspector>,
    bus: Arc<MessageBus>,
    store: Arc<dyn DocumentStore>,
    max_workers: usize,
    temp_ttl: Duration,
    next_id: AtomicU64,
}

impl ScannerPool {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn DocumentStore>,
        inspector: Arc<dyn RepositoryInspector>,
        max_workers: usize,
        temp_ttl: Duration,
    ) -> Self {
        let mut workers = HashMap::new();
        workers.insert(CORE_WORKER.to_string(), ScannerWorker::core());
        Self {
            id: AgentId::new("scanner_manager"),
            workers: Arc::new(RwLock::new(workers)),
            inspector,
            bus,
            store,
            max_workers,
            temp_ttl,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn worker_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resize the pool toward the requested count
    ///
    /// Requests are clamped to 1..=max silently; the `core` worker is never
    /// deactivated. Which ephemeral workers go on shrink is arbitrary map
    /// order, deliberately not LRU or busy-aware. Returns the new size.
    pub async fn adjust_scanner_count(&self, requested: usize) -> usize {
        let target = requested.clamp(1, self.max_workers);
        let mut workers = self.workers.write().await;

        if target > workers.len() {
            let to_add = target - workers.len();
            for _ in 0..to_add {
                let id = format!("scanner_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
                workers.insert(
                    id.clone(),
                    ScannerWorker::ephemeral(id, ScanMode::Targeted, "general"),
                );
            }
            info!(added = to_add, size = workers.len(), "Scanner pool grown");
        } else if target < workers.len() {
            let excess: Vec<String> = workers
                .keys()
                .filter(|id| id.as_str() != CORE_WORKER)
                .take(workers.len() - target)
                .cloned()
                .collect();
            for id in &excess {
                workers.remove(id);
            }
            info!(removed = excess.len(), size = workers.len(), "Scanner pool shrunk");
        }

        workers.len()
    }

    /// Run one scanning strategy across the pool
    pub async fn execute_strategy(
        self: &Arc<Self>,
        mode: ScanMode,
        focus_areas: &[String],
    ) -> Result<StrategyOutcome> {
        let depth = ScanDepth::for_mode(mode);
        let default_focus = "general".to_string();
        let primary_focus = focus_areas.first().unwrap_or(&default_focus).clone();

        match mode {
            // Sequential, core-only.
            ScanMode::Minimal | ScanMode::Continuous => {
                let report = self.run_worker(CORE_WORKER, &primary_focus, depth, mode).await?;
                Ok(StrategyOutcome::Reports(vec![report]))
            }
            // Sequential over idle ephemeral workers, one per focus area.
            ScanMode::Targeted => {
                let idle = self.idle_non_core().await;
                let mut reports = Vec::new();
                let areas: &[String] = if focus_areas.is_empty() {
                    std::slice::from_ref(&default_focus)
                } else {
                    focus_areas
                };
                for (i, focus) in areas.iter().enumerate() {
                    let worker_id = idle.get(i).map(String::as_str).unwrap_or(CORE_WORKER);
                    reports.push(self.run_worker(worker_id, focus, depth, mode).await?);
                }
                Ok(StrategyOutcome::Reports(reports))
            }
            // Parallel across the whole pool.
            ScanMode::Comprehensive | ScanMode::DeepDive => {
                let reports = self.run_all(focus_areas, depth, mode).await;
                if reports.is_empty() {
                    return Err(AgoraError::Other("No scan reports produced".to_string()));
                }
                if mode == ScanMode::DeepDive {
                    Ok(StrategyOutcome::Aggregated(aggregate(&reports)))
                } else {
                    Ok(StrategyOutcome::Reports(reports))
                }
            }
        }
    }

    /// On-demand scan of one focus area
    ///
    /// Prefers an idle non-core worker; when none is idle, spins up a
    /// temporary worker that self-destructs after the TTL regardless of use.
    /// A pool already at capacity runs the scan on the core worker instead.
    pub async fn handle_targeted_scan(self: &Arc<Self>, focus_area: &str) -> Result<ScanReport> {
        let worker_id = match self.idle_non_core().await.into_iter().next() {
            Some(id) => id,
            None => self.spawn_temp_worker(focus_area).await,
        };
        self.run_worker(&worker_id, focus_area, ScanDepth::Standard, ScanMode::Targeted)
            .await
    }

    async fn spawn_temp_worker(&self, focus_area: &str) -> String {
        let id = format!("temp_scanner_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        {
            let mut workers = self.workers.write().await;
            // The ceiling holds for temp workers too; the check happens
            // under the write lock so concurrent spawns cannot race past it.
            if workers.len() >= self.max_workers {
                debug!(
                    size = workers.len(),
                    "Pool at capacity, targeted scan falls back to core worker"
                );
                return CORE_WORKER.to_string();
            }
            workers.insert(
                id.clone(),
                ScannerWorker::ephemeral(id.clone(), ScanMode::Targeted, focus_area),
            );
        }
        debug!(worker = %id, ttl_secs = self.temp_ttl.as_secs(), "Spawned temporary scanner");

        let workers = Arc::clone(&self.workers);
        let worker_id = id.clone();
        let ttl = self.temp_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if workers.write().await.remove(&worker_id).is_some() {
                debug!(worker = %worker_id, "Temporary scanner expired");
            }
        });

        id
    }

    async fn idle_non_core(&self) -> Vec<String> {
        let workers = self.workers.read().await;
        let mut ids: Vec<String> = workers
            .values()
            .filter(|w| !w.busy && w.id != CORE_WORKER)
            .map(|w| w.id.clone())
            .collect();
        ids.sort();
        ids
    }

    async fn run_all(
        self: &Arc<Self>,
        focus_areas: &[String],
        depth: ScanDepth,
        mode: ScanMode,
    ) -> Vec<ScanReport> {
        let ids = self.worker_ids().await;
        let mut set = JoinSet::new();
        for (i, worker_id) in ids.into_iter().enumerate() {
            let pool = Arc::clone(self);
            let focus = if focus_areas.is_empty() {
                "general".to_string()
            } else {
                focus_areas[i % focus_areas.len()].clone()
            };
            set.spawn(async move { pool.run_worker(&worker_id, &focus, depth, mode).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(e)) => warn!(error = %e, "Worker scan failed"),
                Err(e) => warn!(error = %e, "Worker task panicked"),
            }
        }
        // Join order is nondeterministic; fix it for stable aggregation.
        reports.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        reports
    }

    async fn run_worker(
        &self,
        worker_id: &str,
        focus_area: &str,
        depth: ScanDepth,
        mode: ScanMode,
    ) -> Result<ScanReport> {
        {
            let mut workers = self.workers.write().await;
            if let Some(worker) = workers.get_mut(worker_id) {
                worker.busy = true;
            }
        }

        let inspection = self.inspector.inspect(focus_area, depth).await;

        {
            let mut workers = self.workers.write().await;
            if let Some(worker) = workers.get_mut(worker_id) {
                worker.busy = false;
                worker.last_scan = Some(Utc::now());
            }
        }

        let (findings, metrics) = inspection?;
        Ok(ScanReport {
            worker_id: worker_id.to_string(),
            mode,
            focus_area: focus_area.to_string(),
            findings,
            metrics,
            completed_at: Utc::now(),
        })
    }

    /// Run the pool's bus loop until shutdown
    pub fn spawn(
        self: Arc<Self>,
        mut bus_rx: mpsc::UnboundedReceiver<Message>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Scanner pool started");
            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                if let Err(e) = self.handle_bus_message(message).await {
                                    warn!(error = %e, "Scanner directive failed");
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Scanner pool received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    async fn handle_bus_message(self: &Arc<Self>, message: Message) -> Result<()> {
        match message.kind {
            MessageKind::ScannerAllocation => {
                let requested = message
                    .payload
                    .get("scanners")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(1) as usize;
                let mode: ScanMode = message
                    .payload
                    .get("mode")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or(ScanMode::Targeted);
                let focus_areas: Vec<String> = message
                    .payload
                    .get("focus_areas")
                    .cloned()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();

                let size = self.adjust_scanner_count(requested).await;
                debug!(requested, size, %mode, "Applied scanner allocation");

                let outcome = self.execute_strategy(mode, &focus_areas).await?;
                self.publish_outcome(outcome, &message).await
            }
            MessageKind::TargetedScan => {
                let focus = message
                    .payload
                    .get("focus_area")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("general")
                    .to_string();
                let report = self.handle_targeted_scan(&focus).await?;
                self.publish_outcome(StrategyOutcome::Reports(vec![report]), &message)
                    .await
            }
            other => {
                debug!(kind = %other, "Scanner pool ignoring bus message");
                Ok(())
            }
        }
    }

    async fn publish_outcome(&self, outcome: StrategyOutcome, request: &Message) -> Result<()> {
        let payload = match &outcome {
            StrategyOutcome::Reports(reports) => json!({
                "reports": reports,
            }),
            StrategyOutcome::Aggregated(aggregated) => json!({
                "aggregated": aggregated,
            }),
        };

        self.store
            .set(
                collections::SCAN_RESULTS,
                &format!("scan_{}", Utc::now().timestamp_millis()),
                payload.clone(),
            )
            .await?;

        let mut result = Message::new(
            MessageKind::ScanResult,
            self.id.clone(),
            Target::Agent(request.source.clone()),
            payload,
            request.priority,
        );
        if let Some(correlation_id) = request.correlation_id {
            result = result.with_correlation(correlation_id);
        }
        self.bus.send(result).await?;
        Ok(())
    }
}

/// Deduplicate findings across workers and score repository health
///
/// Findings collapse on the `(kind, location)` composite key, first
/// occurrence winning. Metrics are summed (files) or averaged (complexity,
/// coverage, latency) across workers.
pub fn aggregate(reports: &[ScanReport]) -> AggregatedScan {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut findings: Vec<Finding> = Vec::new();
    for report in reports {
        for finding in &report.findings {
            let key = (finding.kind.clone(), finding.location.clone());
            if seen.insert(key) {
                findings.push(finding.clone());
            }
        }
    }

    let count = reports.len().max(1) as f32;
    let metrics = ScanMetrics {
        files_scanned: reports.iter().map(|r| r.metrics.files_scanned).sum(),
        avg_complexity: reports.iter().map(|r| r.metrics.avg_complexity).sum::<f32>() / count,
        coverage_pct: reports.iter().map(|r| r.metrics.coverage_pct).sum::<f32>() / count,
        scan_latency_ms: (reports
            .iter()
            .map(|r| r.metrics.scan_latency_ms)
            .sum::<u64>() as f32
            / count) as u64,
    };

    AggregatedScan {
        health_score: health_score(&metrics),
        worker_count: reports.len(),
        findings,
        metrics,
    }
}

/// Rule-based health score: 100 minus penalties for high average complexity,
/// low coverage, and high latency
pub fn health_score(metrics: &ScanMetrics) -> u8 {
    let mut score: i32 = 100;
    if metrics.avg_complexity > 10.0 {
        score -= 20;
    }
    if metrics.coverage_pct < 50.0 {
        score -= 25;
    }
    if metrics.scan_latency_ms > 1000 {
        score -= 15;
    }
    score.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::Urgency;

    fn report(worker_id: &str, findings: Vec<Finding>, metrics: ScanMetrics) -> ScanReport {
        ScanReport {
            worker_id: worker_id.to_string(),
            mode: ScanMode::DeepDive,
            focus_area: "general".to_string(),
            findings,
            metrics,
            completed_at: Utc::now(),
        }
    }

    fn finding(kind: &str, location: &str) -> Finding {
        Finding {
            kind: kind.to_string(),
            location: location.to_string(),
            detail: String::new(),
            severity: Urgency::Medium,
        }
    }

    fn pool() -> Arc<ScannerPool> {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(MessageBus::new(store.clone(), 64, vec![]));
        Arc::new(ScannerPool::new(
            bus,
            store,
            Arc::new(OfflineInspector),
            8,
            Duration::from_secs(300),
        ))
    }

    #[tokio::test]
    async fn test_pool_bounds() {
        let pool = pool();
        assert_eq!(pool.worker_count().await, 1);

        assert_eq!(pool.adjust_scanner_count(20).await, 8);
        assert_eq!(pool.adjust_scanner_count(0).await, 1, "core survives a zero request");

        let ids = pool.worker_ids().await;
        assert_eq!(ids, vec![CORE_WORKER.to_string()]);
    }

    #[tokio::test]
    async fn test_grow_then_shrink_arithmetic() {
        let pool = pool();
        assert_eq!(pool.adjust_scanner_count(3).await, 3);
        assert_eq!(pool.worker_count().await, 3);

        assert_eq!(pool.adjust_scanner_count(1).await, 1);
        assert!(pool.worker_ids().await.contains(&CORE_WORKER.to_string()));
    }

    #[tokio::test]
    async fn test_targeted_scan_prefers_idle_worker() {
        let pool = pool();
        pool.adjust_scanner_count(2).await;

        let report = pool.handle_targeted_scan("auth").await.unwrap();
        assert_ne!(report.worker_id, CORE_WORKER);
        assert_eq!(pool.worker_count().await, 2, "no temp worker needed");
    }

    #[tokio::test]
    async fn test_targeted_scan_spawns_temp_worker_when_none_idle() {
        let pool = pool();
        // Pool has only the core worker, which is not an idle non-core slot.
        let report = pool.handle_targeted_scan("auth").await.unwrap();
        assert!(report.worker_id.starts_with("temp_scanner_"));
    }

    #[tokio::test]
    async fn test_targeted_scan_never_grows_past_ceiling() {
        let pool = pool();
        assert_eq!(pool.adjust_scanner_count(8).await, 8);
        {
            let mut workers = pool.workers.write().await;
            for worker in workers.values_mut() {
                worker.busy = true;
            }
        }

        let report = pool.handle_targeted_scan("auth").await.unwrap();
        assert_eq!(report.worker_id, CORE_WORKER);
        assert_eq!(pool.worker_count().await, 8, "full pool must not grow");
    }

    #[test]
    fn test_aggregate_dedupes_by_kind_and_location() {
        let reports = vec![
            report(
                "core",
                vec![finding("complexity", "src/a.rs"), finding("todo", "src/b.rs")],
                ScanMetrics::default(),
            ),
            report(
                "scanner_1",
                vec![finding("complexity", "src/a.rs"), finding("complexity", "src/c.rs")],
                ScanMetrics::default(),
            ),
        ];

        let aggregated = aggregate(&reports);
        assert_eq!(aggregated.findings.len(), 3);
        assert_eq!(aggregated.worker_count, 2);
    }

    #[test]
    fn test_aggregate_metrics() {
        let reports = vec![
            report(
                "core",
                vec![],
                ScanMetrics {
                    files_scanned: 10,
                    avg_complexity: 4.0,
                    coverage_pct: 80.0,
                    scan_latency_ms: 100,
                },
            ),
            report(
                "scanner_1",
                vec![],
                ScanMetrics {
                    files_scanned: 30,
                    avg_complexity: 8.0,
                    coverage_pct: 60.0,
                    scan_latency_ms: 300,
                },
            ),
        ];

        let aggregated = aggregate(&reports);
        assert_eq!(aggregated.metrics.files_scanned, 40);
        assert!((aggregated.metrics.avg_complexity - 6.0).abs() < f32::EPSILON);
        assert!((aggregated.metrics.coverage_pct - 70.0).abs() < f32::EPSILON);
        assert_eq!(aggregated.metrics.scan_latency_ms, 200);
        assert_eq!(aggregated.health_score, 100);
    }

    #[test]
    fn test_health_score_penalties() {
        let degraded = ScanMetrics {
            files_scanned: 100,
            avg_complexity: 14.0,
            coverage_pct: 30.0,
            scan_latency_ms: 2500,
        };
        assert_eq!(health_score(&degraded), 40);

        let healthy = ScanMetrics {
            files_scanned: 100,
            avg_complexity: 3.0,
            coverage_pct: 90.0,
            scan_latency_ms: 200,
        };
        assert_eq!(health_score(&healthy), 100);
    }
}
