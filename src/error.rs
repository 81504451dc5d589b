//! Error types for the Agora coordination core
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for Agora operations
#[derive(Error, Debug)]
pub enum AgoraError {
    /// Document store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// LLM API request failed
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Message could not be routed or decoded
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A bus or agent channel was closed before delivery
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Document not found in a collection
    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid operation (e.g., deactivating the core scanner)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Agora operations
pub type Result<T> = std::result::Result<T, AgoraError>;

/// Convert anyhow::Error to AgoraError
impl From<anyhow::Error> for AgoraError {
    fn from(err: anyhow::Error) -> Self {
        AgoraError::Other(err.to_string())
    }
}
