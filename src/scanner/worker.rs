//! Scanner workers and the repository inspection seam
//!
//! A worker is a pool slot, not a thread: the pool drives scans through the
//! [`RepositoryInspector`] collaborator, which wraps whatever repository
//! data-fetch service is wired in. Actual repository analysis quality is out
//! of scope for the core.

use crate::error::Result;
use crate::types::{Finding, ScanMetrics, ScanMode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The permanent worker's id
pub const CORE_WORKER: &str = "core";

/// How deep a single scan pass goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDepth {
    Shallow,
    Standard,
    Deep,
}

impl ScanDepth {
    /// Depth a strategy runs its workers at
    pub fn for_mode(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Minimal => ScanDepth::Shallow,
            ScanMode::Continuous | ScanMode::Targeted => ScanDepth::Standard,
            ScanMode::Comprehensive | ScanMode::DeepDive => ScanDepth::Deep,
        }
    }
}

/// A pool slot
#[derive(Debug, Clone)]
pub struct ScannerWorker {
    pub id: String,
    pub mode: ScanMode,
    pub focus_area: String,
    pub busy: bool,
    pub last_scan: Option<DateTime<Utc>>,
    /// Ephemeral workers are created and destroyed by allocation directives
    /// or targeted-scan TTLs; the core worker is permanent.
    pub ephemeral: bool,
}

impl ScannerWorker {
    pub fn core() -> Self {
        Self {
            id: CORE_WORKER.to_string(),
            mode: ScanMode::Continuous,
            focus_area: "general".to_string(),
            busy: false,
            last_scan: None,
            ephemeral: false,
        }
    }

    pub fn ephemeral(id: impl Into<String>, mode: ScanMode, focus_area: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mode,
            focus_area: focus_area.into(),
            busy: false,
            last_scan: None,
            ephemeral: true,
        }
    }
}

/// Collaborator seam for repository analysis
#[async_trait]
pub trait RepositoryInspector: Send + Sync {
    /// Inspect the repository at the given depth, focused on one area
    async fn inspect(&self, focus_area: &str, depth: ScanDepth)
        -> Result<(Vec<Finding>, ScanMetrics)>;
}

/// Inspector used when no repository service is configured
///
/// Reports an empty, healthy repository so the rest of the pipeline stays
/// exercisable without a connected repo.
pub struct OfflineInspector;

#[async_trait]
impl RepositoryInspector for OfflineInspector {
    async fn inspect(
        &self,
        _focus_area: &str,
        _depth: ScanDepth,
    ) -> Result<(Vec<Finding>, ScanMetrics)> {
        Ok((
            Vec::new(),
            ScanMetrics {
                files_scanned: 0,
                avg_complexity: 0.0,
                coverage_pct: 100.0,
                scan_latency_ms: 0,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_for_mode() {
        assert_eq!(ScanDepth::for_mode(ScanMode::Minimal), ScanDepth::Shallow);
        assert_eq!(ScanDepth::for_mode(ScanMode::Targeted), ScanDepth::Standard);
        assert_eq!(ScanDepth::for_mode(ScanMode::DeepDive), ScanDepth::Deep);
    }

    #[test]
    fn test_core_worker_shape() {
        let core = ScannerWorker::core();
        assert_eq!(core.id, CORE_WORKER);
        assert_eq!(core.mode, ScanMode::Continuous);
        assert!(!core.ephemeral);
    }
}
