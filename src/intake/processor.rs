//! Message processors
//!
//! Two symmetric processors wrap the classification LLM. Each message takes
//! two independent completions, intent extraction and urgency analysis, run
//! concurrently and combined into a [`ProcessedMessage`]. A processor is
//! available while it has no call in flight and its pending count is below
//! the configured ceiling; the hub may still hand it work past that point
//! (best-effort admission, see DESIGN.md).

use crate::error::Result;
use crate::services::llm::{parse_json_response, CompletionProvider};
use crate::types::{AgentId, ProcessedMessage, Urgency, UserMessage};
use chrono::Utc;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct IntentExtraction {
    intent: String,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(default)]
    suggested_action: String,
}

#[derive(Debug, Deserialize)]
struct UrgencyAssessment {
    urgency: Urgency,
}

/// One intake processor
pub struct MessageProcessor {
    id: AgentId,
    llm: Arc<dyn CompletionProvider>,
    classification_model: String,
    urgency_model: String,
    /// Calls currently executing; a counter, since the hub may dispatch
    /// several `process()` calls concurrently
    in_flight: AtomicUsize,
    pending: AtomicUsize,
    max_pending: usize,
}

impl MessageProcessor {
    pub fn new(
        id: AgentId,
        llm: Arc<dyn CompletionProvider>,
        classification_model: impl Into<String>,
        urgency_model: impl Into<String>,
        max_pending: usize,
    ) -> Self {
        Self {
            id,
            llm,
            classification_model: classification_model.into(),
            urgency_model: urgency_model.into(),
            in_flight: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            max_pending,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Number of messages assigned but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Availability predicate: no call in flight and below the pending
    /// ceiling
    pub fn is_available(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0 && self.pending() < self.max_pending
    }

    /// Claim a pending slot before the processing task is spawned, so load
    /// balancing sees the assignment immediately
    pub fn reserve(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Process one reserved message
    pub async fn process(&self, message: UserMessage) -> Result<ProcessedMessage> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.run(message).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.pending.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn run(&self, message: UserMessage) -> Result<ProcessedMessage> {
        debug!(processor = %self.id, message_id = %message.id, "Processing user message");

        let (extraction, assessment) = tokio::join!(
            self.extract_intent(&message),
            self.assess_urgency(&message)
        );
        let extraction = extraction?;
        let assessment = assessment?;

        Ok(ProcessedMessage {
            message,
            intent: extraction.intent,
            entities: extraction.entities,
            urgency: assessment.urgency,
            suggested_action: extraction.suggested_action,
            agent_id: self.id.clone(),
            processed_at: Utc::now(),
        })
    }

    async fn extract_intent(&self, message: &UserMessage) -> Result<IntentExtraction> {
        let prompt = format!(
            r#"You are classifying a hackathon participant's message for routing.

Participant: {}
Message: {}
Context: {}

Respond with JSON only, no prose:
{{"intent": "<one of: status_update, help_request, task_question, blocker_report, idea_proposal, other>",
 "entities": ["<named people, tasks, or technologies mentioned>"],
 "suggested_action": "<one concrete next step for the coordination system>"}}
"#,
            message.user_name, message.content, message.context
        );

        let response = self.llm.complete(&prompt, &self.classification_model).await?;
        parse_json_response(&response)
    }

    async fn assess_urgency(&self, message: &UserMessage) -> Result<UrgencyAssessment> {
        let prompt = format!(
            r#"Rate the urgency of this hackathon participant message.

Message: {}
Context: {}

Respond with JSON only:
{{"urgency": "<low|medium|high|critical>"}}
"#,
            message.content, message.context
        );

        let response = self.llm.complete(&prompt, &self.urgency_model).await?;
        parse_json_response(&response)
    }
}
