//! Configuration for the Agora coordination core
//!
//! Settings are layered: compiled defaults, an optional TOML file, then
//! environment variables with the `AGORA_` prefix (e.g.
//! `AGORA_SCANNER__MAX_WORKERS=4`). API keys are only ever read from the
//! environment.

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

/// Message bus settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bounded history capacity (most recent N messages)
    pub history_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
        }
    }
}

/// Intake queue and processor pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Queue poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Per-processor pending-queue ceiling
    pub max_pending: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_pending: 5,
        }
    }
}

/// Decision engine settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Proactive review interval in seconds
    pub tick_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { tick_secs: 10 }
    }
}

/// Scanner pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Hard ceiling on pool size
    pub max_workers: usize,
    /// Self-destruct TTL for temporary workers, in seconds
    pub temp_worker_ttl_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            temp_worker_ttl_secs: 300,
        }
    }
}

/// Health monitor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Health check interval in seconds
    pub tick_secs: u64,
    /// Rolling error count that triggers a critical alert
    pub error_threshold: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            error_threshold: 50,
        }
    }
}

/// Roadmap orchestrator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoadmapConfig {
    /// Periodic wholesale-persist interval in seconds
    pub persist_interval_secs: u64,
}

impl Default for RoadmapConfig {
    fn default() -> Self {
        Self {
            persist_interval_secs: 300,
        }
    }
}

/// LLM provider and model selection
///
/// The three call sites (intent classification, urgency analysis, strategic
/// decisions) each name a provider and model; providers resolve their API
/// keys from their own environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub classification_provider: String,
    pub classification_model: String,
    pub urgency_provider: String,
    pub urgency_model: String,
    pub strategy_provider: String,
    pub strategy_model: String,
    /// Max tokens for completions
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            classification_provider: "anthropic".to_string(),
            classification_model: "claude-3-5-haiku-20241022".to_string(),
            urgency_provider: "anthropic".to_string(),
            urgency_model: "claude-3-5-haiku-20241022".to_string(),
            strategy_provider: "anthropic".to_string(),
            strategy_model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Root configuration for the coordination core
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgoraConfig {
    pub bus: BusConfig,
    pub intake: IntakeConfig,
    pub engine: EngineConfig,
    pub scanner: ScannerConfig,
    pub health: HealthConfig,
    pub roadmap: RoadmapConfig,
    pub llm: LlmConfig,
}

impl AgoraConfig {
    /// Load configuration from an optional file plus `AGORA_*` environment
    /// variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("AGORA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AgoraConfig::default();
        assert_eq!(cfg.bus.history_capacity, 1000);
        assert_eq!(cfg.intake.poll_interval_ms, 100);
        assert_eq!(cfg.intake.max_pending, 5);
        assert_eq!(cfg.engine.tick_secs, 10);
        assert_eq!(cfg.scanner.max_workers, 8);
        assert_eq!(cfg.scanner.temp_worker_ttl_secs, 300);
        assert_eq!(cfg.health.error_threshold, 50);
        assert_eq!(cfg.roadmap.persist_interval_secs, 300);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let cfg = AgoraConfig::load(None).unwrap();
        assert_eq!(cfg.scanner.max_workers, 8);
        assert_eq!(cfg.llm.classification_provider, "anthropic");
    }
}
