//! Fixtures shared by the unit tests.

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::{DatabaseConfig, SearchConfig};
use crate::db::db_pool::build_pool;
use crate::db::schema::ensure_schema;
use crate::db::DbPool;
use crate::llm::models::{AssistantMessage, ChatRequest, FunctionCall, ToolCall};
use crate::llm::{ChatModel, LlmError, TextStream};

pub fn memory_pool() -> DbPool {
    let pool = build_pool(&DatabaseConfig {
        path: ":memory:".to_string(),
        pool_size: 2,
    })
    .unwrap();
    ensure_schema(&pool.get().unwrap()).unwrap();
    pool
}

/// Four calls across two topics and a handful of key phrases.
pub fn seed_calls(pool: &DbPool) {
    let conn = pool.get().unwrap();
    conn.execute_batch(
        "INSERT INTO km_processed_data
             (ConversationId, StartTime, EndTime, Content, summary, satisfied, sentiment, topic, keyphrases, complaint)
         VALUES
             ('c1', TIMESTAMP '2024-01-10 09:00:00', TIMESTAMP '2024-01-10 09:10:00', 'I was charged a late fee', 'Late fee dispute', 'yes', 'negative', 'Billing', 'late fee', 'late fee'),
             ('c2', TIMESTAMP '2024-01-08 14:00:00', TIMESTAMP '2024-01-08 14:20:00', 'Please refund the late fee', 'Refund request', 'no', 'negative', 'Billing', 'late fee, refund', 'refund'),
             ('c3', TIMESTAMP '2024-01-02 11:00:00', TIMESTAMP '2024-01-02 11:06:00', 'Thanks for updating my plan', 'Plan change', 'yes', 'positive', 'Billing', 'plan change', NULL),
             ('c4', TIMESTAMP '2023-12-20 16:30:00', TIMESTAMP '2023-12-20 16:34:00', 'My internet is down', 'Outage report', 'no', 'neutral', 'Internet Outage', 'router reset', 'outage');
         INSERT INTO processed_data_key_phrases (ConversationId, key_phrase, sentiment)
         VALUES
             ('c1', 'late fee', 'negative'),
             ('c2', 'late fee', 'negative'),
             ('c2', 'refund', 'neutral'),
             ('c4', 'router reset', 'neutral');",
    )
    .unwrap();
}

pub fn search_config() -> SearchConfig {
    SearchConfig {
        endpoint: "https://search.example.net".to_string(),
        api_key: "search-key".to_string(),
        index: "call_transcripts".to_string(),
        semantic_configuration: "my-semantic-config".to_string(),
        embedding_deployment: "text-embedding-ada-002".to_string(),
        strictness: 3,
        top_n_documents: 5,
    }
}

/// An assistant reply that calls `name` with the raw JSON `arguments`.
pub fn tool_call(id: &str, name: &str, arguments: &str) -> AssistantMessage {
    AssistantMessage {
        content: None,
        tool_calls: vec![ToolCall {
            id: id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }],
    }
}

/// A chat model that plays back queued replies and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<AssistantMessage, LlmError>>>,
    streams: Mutex<VecDeque<Vec<String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, message: AssistantMessage) -> Self {
        self.replies.lock().unwrap().push_back(Ok(message));
        self
    }

    pub fn fail(self, error: LlmError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn stream_reply(self, chunks: Vec<&str>) -> Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(chunks.into_iter().map(str::to_string).collect());
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: ChatRequest) -> Result<AssistantMessage, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::ResponseError("no scripted reply left".into())))
    }

    async fn stream(&self, mut request: ChatRequest) -> Result<TextStream, LlmError> {
        request.stream = true;
        self.requests.lock().unwrap().push(request);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::StreamError("no scripted stream left".into()))?;
        Ok(Box::pin(stream::iter(
            chunks.into_iter().map(Ok::<String, LlmError>),
        )))
    }
}
