//! Code snippet extraction
//!
//! The [`CodeExtractor`] listens to classified user traffic and pulls fenced
//! code blocks out of message content into the snippets collection, keyed by
//! message id, so the rest of the system can reference shared code without
//! re-parsing chat logs.

use crate::bus::{Message, MessageKind};
use crate::error::Result;
use crate::health::ErrorTracker;
use crate::storage::{collections, DocumentStore};
use crate::types::{AgentId, ProcessedMessage};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// One fenced block lifted from a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    pub language: Option<String>,
    pub code: String,
}

/// Extract fenced code blocks from markdown-ish content
///
/// Unterminated fences are dropped rather than swallowing the rest of the
/// message as code.
pub fn extract_snippets(content: &str) -> Vec<Snippet> {
    let mut snippets = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("```") {
            let language = {
                let tag = rest.trim();
                if tag.is_empty() {
                    None
                } else {
                    Some(tag.to_string())
                }
            };
            let mut body = Vec::new();
            let mut terminated = false;
            for inner in lines.by_ref() {
                if inner.trim_start().starts_with("```") {
                    terminated = true;
                    break;
                }
                body.push(inner);
            }
            if terminated && !body.is_empty() {
                snippets.push(Snippet {
                    language,
                    code: body.join("\n"),
                });
            }
        }
    }

    snippets
}

pub struct CodeExtractor {
    id: AgentId,
    store: Arc<dyn DocumentStore>,
    errors: Arc<ErrorTracker>,
}

impl CodeExtractor {
    pub fn new(store: Arc<dyn DocumentStore>, errors: Arc<ErrorTracker>) -> Self {
        Self {
            id: AgentId::new("code_extractor"),
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
            info!("Code extractor started");
            loop {
                tokio::select! {
                    maybe = bus_rx.recv() => {
                        match maybe {
                            Some(message) => {
                                if let Err(e) = self.handle(message).await {
                                    warn!(error = %e, "Snippet extraction failed");
                                    self.errors.record();
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Code extractor received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub async fn handle(&self, message: Message) -> Result<()> {
        if message.kind != MessageKind::UserCommunication {
            return Ok(());
        }
        let processed: ProcessedMessage = match serde_json::from_value(message.payload) {
            Ok(p) => p,
            Err(_) => return Ok(()),
        };

        let snippets = extract_snippets(&processed.message.content);
        if snippets.is_empty() {
            return Ok(());
        }

        debug!(
            user_id = %processed.message.user_id,
            count = snippets.len(),
            "Extracted code snippets"
        );
        for (index, snippet) in snippets.iter().enumerate() {
            let key = format!("{}_{}", processed.message.id, index);
            self.store
                .set(
                    collections::SNIPPETS,
                    &key,
                    json!({
                        "user_id": processed.message.user_id,
                        "message_id": processed.message.id,
                        "language": snippet.language,
                        "code": snippet.code,
                        "extracted_at": chrono::Utc::now(),
                    }),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_tagged_and_untagged_blocks() {
        let content = "look at this\n```rust\nfn main() {}\n```\nand\n```\nplain\n```";
        let snippets = extract_snippets(content);
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].language.as_deref(), Some("rust"));
        assert_eq!(snippets[0].code, "fn main() {}");
        assert_eq!(snippets[1].language, None);
    }

    #[test]
    fn test_unterminated_fence_is_dropped() {
        let snippets = extract_snippets("```rust\nfn broken(");
        assert!(snippets.is_empty());
    }

    #[test]
    fn test_plain_text_yields_nothing() {
        assert!(extract_snippets("no code here").is_empty());
    }
}
