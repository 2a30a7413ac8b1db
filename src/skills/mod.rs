pub mod greeting;
pub mod sql_chat;
pub mod sql_guard;
pub mod transcripts;

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::db::DbError;
use crate::llm::models::{FunctionDefinition, ToolDefinition};
use crate::llm::LlmError;
use crate::skills::sql_guard::SqlGuardError;

#[derive(Debug, Error)]
pub enum SkillError {
    #[error(transparent)]
    Upstream(#[from] LlmError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("generated SQL was rejected: {0}")]
    RejectedSql(#[from] SqlGuardError),
    #[error("skill `{0}` is not registered")]
    NotRegistered(&'static str),
}

/// The closed set of capabilities offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkillKind {
    Greeting,
    ChatWithSqlDatabase,
    ChatWithCallTranscripts,
}

impl SkillKind {
    pub const ALL: [SkillKind; 3] = [
        SkillKind::Greeting,
        SkillKind::ChatWithSqlDatabase,
        SkillKind::ChatWithCallTranscripts,
    ];

    /// Function name as the model sees it.
    pub fn name(self) -> &'static str {
        match self {
            SkillKind::Greeting => "Greeting",
            SkillKind::ChatWithSqlDatabase => "ChatWithSQLDatabase",
            SkillKind::ChatWithCallTranscripts => "ChatWithCallTranscripts",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SkillKind::Greeting => "Respond to any greeting or general questions",
            SkillKind::ChatWithSqlDatabase => "Given a query, get details from the database",
            SkillKind::ChatWithCallTranscripts => "given a query, get answers from search index",
        }
    }

    /// Name of the single string argument the function takes.
    pub fn parameter(self) -> &'static str {
        match self {
            SkillKind::Greeting | SkillKind::ChatWithSqlDatabase => "input",
            SkillKind::ChatWithCallTranscripts => "question",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

#[async_trait]
pub trait Skill: Send + Sync {
    fn kind(&self) -> SkillKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn description(&self) -> &'static str {
        self.kind().description()
    }

    /// Function-calling declaration with a single required string argument.
    fn tool_definition(&self) -> ToolDefinition {
        let parameter = self.kind().parameter();
        let mut properties = serde_json::Map::new();
        properties.insert(
            parameter.to_string(),
            json!({"type": "string", "description": "the question"}),
        );

        ToolDefinition {
            kind: "function",
            function: FunctionDefinition {
                name: self.name(),
                description: self.description(),
                parameters: json!({
                    "type": "object",
                    "properties": properties,
                    "required": [parameter],
                }),
            },
        }
    }

    async fn invoke(&self, input: &str) -> Result<String, SkillError>;
}

#[derive(Clone, Default)]
pub struct SkillRegistry {
    skills: HashMap<SkillKind, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, skill: impl Skill + 'static) -> Self {
        self.skills.insert(skill.kind(), Arc::new(skill));
        self
    }

    /// Tool definitions for every registered skill, in declaration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        SkillKind::ALL
            .iter()
            .filter_map(|kind| self.skills.get(kind))
            .map(|skill| skill.tool_definition())
            .collect()
    }

    pub async fn invoke(&self, kind: SkillKind, input: &str) -> Result<String, SkillError> {
        let skill = self
            .skills
            .get(&kind)
            .ok_or(SkillError::NotRegistered(kind.name()))?;
        debug!(skill = skill.name(), "Invoking skill");
        skill.invoke(input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(SkillKind);

    #[async_trait]
    impl Skill for Echo {
        fn kind(&self) -> SkillKind {
            self.0
        }

        async fn invoke(&self, input: &str) -> Result<String, SkillError> {
            Ok(format!("{}: {}", self.name(), input))
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in SkillKind::ALL {
            assert_eq!(SkillKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(SkillKind::from_name("ChatWithData-Greeting"), None);
    }

    #[test]
    fn tool_definition_declares_one_required_string() {
        let tool = Echo(SkillKind::ChatWithCallTranscripts).tool_definition();
        let body = serde_json::to_value(&tool).unwrap();

        assert_eq!(body["type"], "function");
        assert_eq!(body["function"]["name"], "ChatWithCallTranscripts");
        assert_eq!(body["function"]["parameters"]["required"], json!(["question"]));
        assert_eq!(
            body["function"]["parameters"]["properties"]["question"]["type"],
            "string"
        );
    }

    #[tokio::test]
    async fn registry_dispatches_by_kind() {
        let registry = SkillRegistry::new()
            .register(Echo(SkillKind::ChatWithCallTranscripts))
            .register(Echo(SkillKind::Greeting));

        let names: Vec<_> = registry
            .tool_definitions()
            .into_iter()
            .map(|t| t.function.name)
            .collect();
        assert_eq!(names, vec!["Greeting", "ChatWithCallTranscripts"]);

        let answer = registry.invoke(SkillKind::Greeting, "hi").await.unwrap();
        assert_eq!(answer, "Greeting: hi");

        let err = registry
            .invoke(SkillKind::ChatWithSqlDatabase, "count calls")
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::NotRegistered("ChatWithSQLDatabase")));
    }
}
