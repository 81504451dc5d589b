//! Agora - Hackathon Coordination Core
//!
//! Standalone entry point: starts the agent manager with in-memory storage
//! and logs outbound responses. Real deployments embed the library behind a
//! chat transport instead.

use agora_core::agents::manager::LlmProviders;
use agora_core::scanner::OfflineInspector;
use agora_core::services::llm::{
    AnthropicProvider, CompletionProvider, GeminiProvider, OpenAiProvider,
};
use agora_core::{AgentManager, AgoraConfig, AgoraError, MemoryStore, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agora", about = "Hackathon coordination core", version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity
    #[arg(short, long)]
    verbose: bool,
}

fn build_provider(
    name: &str,
    max_tokens: usize,
    temperature: f32,
) -> Result<Arc<dyn CompletionProvider>> {
    match name {
        "anthropic" => Ok(Arc::new(AnthropicProvider::from_env(max_tokens, temperature)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::from_env(max_tokens, temperature)?)),
        "gemini" => Ok(Arc::new(GeminiProvider::from_env(max_tokens, temperature)?)),
        other => Err(AgoraError::Config(config::ConfigError::Message(format!(
            "unknown LLM provider: {other}"
        )))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("agora={default_level}"))),
        )
        .init();

    let config = AgoraConfig::load(cli.config.as_deref())?;
    info!(
        max_workers = config.scanner.max_workers,
        "Loaded configuration"
    );

    let intake = build_provider(
        &config.llm.classification_provider,
        config.llm.max_tokens,
        config.llm.temperature,
    )?;
    let strategy = if config.llm.strategy_provider == config.llm.classification_provider {
        intake.clone()
    } else {
        build_provider(
            &config.llm.strategy_provider,
            config.llm.max_tokens,
            config.llm.temperature,
        )?
    };

    let store = Arc::new(MemoryStore::new());
    let (manager, mut outbound) = AgentManager::start(
        config,
        LlmProviders { intake, strategy },
        Arc::new(OfflineInspector),
        store,
    )
    .await?;

    // Without an embedding transport, outbound responses go to the log.
    let drain = tokio::spawn(async move {
        while let Some(response) = outbound.recv().await {
            if response.ok {
                info!(user_id = %response.user_id, body = %response.body, "Outbound response");
            } else {
                warn!(user_id = %response.user_id, body = %response.body, "Outbound failure");
            }
        }
    });

    info!("Agora running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    manager.shutdown().await;
    drain.abort();
    info!("Goodbye");
    Ok(())
}
