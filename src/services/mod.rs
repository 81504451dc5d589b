//! Services layer for the Agora coordination core
//!
//! Provides LLM completion providers used by the intake processors and the
//! decision engine.

pub mod llm;

pub use llm::{
    parse_json_response, AnthropicProvider, CompletionProvider, GeminiProvider, OpenAiProvider,
};
