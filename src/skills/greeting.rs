use async_trait::async_trait;

use crate::llm::completion::CompletionClient;
use crate::skills::{Skill, SkillError, SkillKind};

const SYSTEM_PROMPT: &str = "You are a helpful assistant to respond to any greeting or general questions.";

/// Small talk and general questions that need no data.
pub struct GreetingSkill {
    completion: CompletionClient,
}

impl GreetingSkill {
    pub fn new(completion: CompletionClient) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Skill for GreetingSkill {
    fn kind(&self) -> SkillKind {
        SkillKind::Greeting
    }

    async fn invoke(&self, input: &str) -> Result<String, SkillError> {
        Ok(self.completion.complete(SYSTEM_PROMPT, input).await?)
    }
}
