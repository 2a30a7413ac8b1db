use serde::{Deserialize, Serialize};

use crate::llm::CompletionOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: vec![call],
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object, as the model produced it.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// Azure "On Your Data" extension attached to a completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    AzureSearch { parameters: AzureSearchParameters },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AzureSearchParameters {
    pub endpoint: String,
    pub index_name: String,
    pub semantic_configuration: String,
    pub query_type: &'static str,
    pub fields_mapping: FieldsMapping,
    pub in_scope: bool,
    pub role_information: String,
    pub strictness: u8,
    pub top_n_documents: u32,
    pub authentication: SearchAuthentication,
    pub embedding_dependency: EmbeddingDependency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldsMapping {
    pub content_fields_separator: &'static str,
    pub content_fields: Vec<&'static str>,
    pub filepath_field: &'static str,
    pub title_field: &'static str,
    pub url_field: &'static str,
    pub vector_fields: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchAuthentication {
    ApiKey { key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingDependency {
    DeploymentName { deployment_name: String },
}

/// Body of a chat-completions call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub seed: u64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<DataSource>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, options: &CompletionOptions) -> Self {
        Self {
            messages,
            temperature: options.temperature,
            seed: options.seed,
            max_tokens: options.max_tokens,
            tools: Vec::new(),
            tool_choice: None,
            data_sources: Vec::new(),
            stream: false,
        }
    }

    /// `choice` is `"auto"` to let the model pick, `"none"` to forbid calls.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>, choice: &'static str) -> Self {
        self.tools = tools;
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_data_source(mut self, source: DataSource) -> Self {
        self.data_sources.push(source);
        self
    }
}

/// What the model said back in a non-streamed call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantMessage {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChoice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkDelta {
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_unused_extensions() {
        let request = ChatRequest::new(
            vec![ChatMessage::system("be brief"), ChatMessage::user("hello")],
            &CompletionOptions::default(),
        );

        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(
            body,
            json!({
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hello"}
                ],
                "temperature": 0.0,
                "seed": 42,
                "max_tokens": 800,
                "stream": false
            })
        );
    }

    #[test]
    fn tool_round_trip_messages_serialize_in_openai_shape() {
        let call = ToolCall {
            id: "call_1".to_string(),
            kind: function_kind(),
            function: FunctionCall {
                name: "Greeting".to_string(),
                arguments: r#"{"input":"hi"}"#.to_string(),
            },
        };

        let assistant = serde_json::to_value(ChatMessage::assistant_tool_call(call)).unwrap();
        let tool = serde_json::to_value(ChatMessage::tool_result("call_1", "Hello!")).unwrap();

        assert_eq!(
            assistant,
            json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "Greeting", "arguments": "{\"input\":\"hi\"}"}
                }]
            })
        );
        assert_eq!(
            tool,
            json!({"role": "tool", "content": "Hello!", "tool_call_id": "call_1"})
        );
    }
}
