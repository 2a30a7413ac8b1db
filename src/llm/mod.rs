pub mod completion;
pub mod grounded;
pub mod models;
pub mod providers;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::config::LlmConfig;
use crate::llm::models::{AssistantMessage, ChatRequest};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
    #[error("LLM stream error: {0}")]
    StreamError(String),
    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Incremental answer text, in the order the model produced it.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// A hosted chat-completion deployment.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<AssistantMessage, LlmError>;

    async fn stream(&self, request: ChatRequest) -> Result<TextStream, LlmError>;
}

/// Decoding options shared by every request this service sends.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub seed: u64,
    pub max_tokens: u32,
}

impl From<&LlmConfig> for CompletionOptions {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            seed: config.seed,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            seed: 42,
            max_tokens: 800,
        }
    }
}
