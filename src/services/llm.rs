//! LLM completion providers
//!
//! Three interchangeable providers sit behind the [`CompletionProvider`]
//! trait: Anthropic messages, OpenAI chat completions, and Gemini
//! generateContent. Call sites expect either plain text or JSON-parseable
//! text; an empty response or a parse failure is a hard error, since there is
//! no safe fallback value for a classification or a decision.

use crate::error::{AgoraError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::debug;

/// A completion call against one LLM provider
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a prompt with the named model, returning the raw text
    async fn complete(&self, prompt: &str, model: &str) -> Result<String>;

    /// Provider name for logging and configuration lookup
    fn name(&self) -> &str;
}

/// Parse a JSON payload out of an LLM response, tolerating markdown fences
///
/// Empty responses and unparseable payloads are hard errors.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AgoraError::LlmApi("Empty response from provider".to_string()));
    }

    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    serde_json::from_str(body)
        .map_err(|e| AgoraError::LlmApi(format!("Failed to parse response as JSON: {}", e)))
}

// --- Anthropic ---

/// Anthropic messages API provider
pub struct AnthropicProvider {
    api_key: String,
    max_tokens: usize,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

impl AnthropicProvider {
    /// Create a provider reading `ANTHROPIC_API_KEY` from the environment
    pub fn from_env(max_tokens: usize, temperature: f32) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return Err(AgoraError::Config(config::ConfigError::Message(
                "ANTHROPIC_API_KEY not set".to_string(),
            )));
        }
        Ok(Self {
            api_key,
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        debug!(model, "Calling Anthropic API");

        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgoraError::LlmApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AgoraError::LlmApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .content
            .first()
            .map(|c| c.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AgoraError::LlmApi("Empty response from API".to_string()))
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// --- OpenAI ---

/// OpenAI chat completions provider
pub struct OpenAiProvider {
    api_key: String,
    max_tokens: usize,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider reading `OPENAI_API_KEY` from the environment
    pub fn from_env(max_tokens: usize, temperature: f32) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return Err(AgoraError::Config(config::ConfigError::Message(
                "OPENAI_API_KEY not set".to_string(),
            )));
        }
        Ok(Self {
            api_key,
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        debug!(model, "Calling OpenAI API");

        let request = OpenAiRequest {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgoraError::LlmApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| AgoraError::LlmApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AgoraError::LlmApi("Empty response from API".to_string()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// --- Gemini ---

/// Google Gemini generateContent provider
pub struct GeminiProvider {
    api_key: String,
    max_tokens: usize,
    temperature: f32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiProvider {
    /// Create a provider reading `GEMINI_API_KEY` from the environment
    pub fn from_env(max_tokens: usize, temperature: f32) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return Err(AgoraError::Config(config::ConfigError::Message(
                "GEMINI_API_KEY not set".to_string(),
            )));
        }
        Ok(Self {
            api_key,
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &str, model: &str) -> Result<String> {
        debug!(model, "Calling Gemini API");

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, self.api_key
        );

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AgoraError::LlmApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AgoraError::LlmApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AgoraError::LlmApi("Empty response from API".to_string()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        intent: String,
    }

    #[test]
    fn test_parse_json_response_plain() {
        let sample: Sample = parse_json_response(r#"{"intent": "status_update"}"#).unwrap();
        assert_eq!(sample.intent, "status_update");
    }

    #[test]
    fn test_parse_json_response_fenced() {
        let text = "```json\n{\"intent\": \"help_request\"}\n```";
        let sample: Sample = parse_json_response(text).unwrap();
        assert_eq!(sample.intent, "help_request");
    }

    #[test]
    fn test_parse_json_response_empty_is_error() {
        let result: Result<Sample> = parse_json_response("   ");
        assert!(matches!(result, Err(AgoraError::LlmApi(_))));
    }

    #[test]
    fn test_parse_json_response_garbage_is_error() {
        let result: Result<Sample> = parse_json_response("not json at all");
        assert!(matches!(result, Err(AgoraError::LlmApi(_))));
    }
}
