use async_trait::async_trait;

use crate::llm::grounded::GroundedClient;
use crate::skills::{Skill, SkillError, SkillKind};

pub const ANALYST_PROMPT: &str = "You are an assistant who provides an analyst with helpful information about data.
You have access to the call transcripts, call data, topics, sentiments, and key phrases.
You can use this information to answer questions.
If you cannot answer the question, always return - I cannot answer this question from the data available. Please rephrase or add more details.";

/// Answers from the call-transcript search index.
pub struct TranscriptSkill {
    grounded: GroundedClient,
}

impl TranscriptSkill {
    pub fn new(grounded: GroundedClient) -> Self {
        Self { grounded }
    }
}

#[async_trait]
impl Skill for TranscriptSkill {
    fn kind(&self) -> SkillKind {
        SkillKind::ChatWithCallTranscripts
    }

    async fn invoke(&self, question: &str) -> Result<String, SkillError> {
        Ok(self.grounded.complete_grounded(ANALYST_PROMPT, question).await?)
    }
}
