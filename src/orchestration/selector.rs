use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::llm::models::{ChatMessage, ChatRequest, ToolDefinition};
use crate::llm::{ChatModel, CompletionOptions, LlmError};
use crate::skills::SkillKind;

/// A skill call the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillInvocation {
    pub call_id: String,
    pub skill: SkillKind,
    pub input: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// The model answered without calling a skill.
    Direct(String),
    Invoke(SkillInvocation),
}

/// Decides whether a conversation needs a skill, and which one.
#[async_trait]
pub trait SkillSelector: Send + Sync {
    async fn select(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Selection, LlmError>;
}

/// Lets the chat model choose through function calling.
pub struct ModelSelector {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl ModelSelector {
    pub fn new(model: Arc<dyn ChatModel>, options: CompletionOptions) -> Self {
        Self { model, options }
    }
}

#[async_trait]
impl SkillSelector for ModelSelector {
    async fn select(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<Selection, LlmError> {
        let request =
            ChatRequest::new(messages.to_vec(), &self.options).with_tools(tools.to_vec(), "auto");
        let reply = self.model.complete(request).await?;

        // Only the first call is honoured; one skill runs per question.
        let Some(call) = reply.tool_calls.into_iter().next() else {
            return reply
                .content
                .filter(|text| !text.trim().is_empty())
                .map(Selection::Direct)
                .ok_or(LlmError::EmptyResponse);
        };

        let skill = SkillKind::from_name(&call.function.name).ok_or_else(|| {
            LlmError::ResponseError(format!("model called unknown function `{}`", call.function.name))
        })?;

        let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
            .map_err(|e| LlmError::ResponseError(format!("invalid function arguments: {}", e)))?;
        let input = arguments
            .get(skill.parameter())
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                LlmError::ResponseError(format!(
                    "function `{}` called without string argument `{}`",
                    skill.name(),
                    skill.parameter()
                ))
            })?
            .to_string();

        debug!(skill = skill.name(), call_id = %call.id, "Model selected skill");
        Ok(Selection::Invoke(SkillInvocation {
            call_id: call.id,
            skill,
            input,
        }))
    }
}
