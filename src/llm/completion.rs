use std::sync::Arc;

use crate::llm::models::{ChatMessage, ChatRequest};
use crate::llm::{ChatModel, CompletionOptions, LlmError};

/// Plain system + user completions with the service-wide decoding options.
#[derive(Clone)]
pub struct CompletionClient {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl CompletionClient {
    pub fn new(model: Arc<dyn ChatModel>, options: CompletionOptions) -> Self {
        Self { model, options }
    }

    pub async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String, LlmError> {
        let request = ChatRequest::new(
            vec![ChatMessage::system(system_prompt), ChatMessage::user(user_text)],
            &self.options,
        );

        let reply = self.model.complete(request).await?;
        reply
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}
