use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::db_utils::render_rows;
use crate::db::schema::{CALLS_TABLE, KEY_PHRASES_TABLE};
use crate::db::{with_connection, DbPool};
use crate::llm::completion::CompletionClient;
use crate::skills::sql_guard;
use crate::skills::{Skill, SkillError, SkillKind};

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Natural language to SQL over the call tables, executed read-only.
pub struct SqlChatSkill {
    completion: CompletionClient,
    pool: DbPool,
}

impl SqlChatSkill {
    pub fn new(completion: CompletionClient, pool: DbPool) -> Self {
        Self { completion, pool }
    }
}

pub fn sql_prompt(query: &str) -> String {
    format!(
        "A valid DuckDB SQL query to find {query} for tables and columns provided below:
1. Table: {CALLS_TABLE}
Columns: ConversationId,EndTime,StartTime,Content,summary,satisfied,sentiment,topic,keyphrases,complaint
2. Table: {KEY_PHRASES_TABLE}
Columns: ConversationId,key_phrase,sentiment
Use ConversationId as the primary key in tables for queries but not for any other operations.
Only return the generated sql query. do not return anything else."
    )
}

#[async_trait]
impl Skill for SqlChatSkill {
    fn kind(&self) -> SkillKind {
        SkillKind::ChatWithSqlDatabase
    }

    async fn invoke(&self, input: &str) -> Result<String, SkillError> {
        let generated = self.completion.complete(SYSTEM_PROMPT, &sql_prompt(input)).await?;

        let sql = sql_guard::validate(&generated).inspect_err(|e| {
            warn!("Rejected generated SQL ({}): {}", e, generated);
        })?;
        debug!(sql = sql.as_str(), "Executing generated SQL");

        let rows = with_connection(&self.pool, move |conn| render_rows(conn, sql.as_str())).await?;
        Ok(rows)
    }
}
