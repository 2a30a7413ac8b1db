use crate::config::LlmConfig;
use crate::llm::models::{AssistantMessage, ChatRequest, CompletionChunk, CompletionResponse};
use crate::llm::{ChatModel, LlmError, TextStream};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{future, StreamExt};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Chat completions against an Azure OpenAI deployment.
pub struct AzureOpenAiProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

enum StreamEvent {
    Text(String),
    Skip,
    Done,
}

impl AzureOpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::ConfigError(
                "API key is required for the Azure OpenAI provider".to_string(),
            ));
        }

        // Connect and per-read deadlines only; paced streams are drained
        // slower than they arrive.
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            url: completions_url(&config.endpoint, &config.deployment, &config.api_version),
            api_key: config.api_key.clone(),
        })
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, LlmError> {
        debug!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            data_sources = request.data_sources.len(),
            stream = request.stream,
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Try to get the error message from the response body
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Azure OpenAI responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {}{}",
                status, error_body
            )));
        }

        Ok(response)
    }
}

pub fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

fn parse_stream_event(data: &str) -> Result<StreamEvent, LlmError> {
    trace!("Azure OpenAI SSE: {:?}", data);
    if data.trim() == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    let event: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| LlmError::StreamError(format!("SSE parsing error: {}, data: {}", e, data)))?;

    if let Some(err) = event.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("An error occurred during streaming");
        return Err(LlmError::StreamError(message.to_string()));
    }

    let chunk: CompletionChunk = serde_json::from_value(event)
        .map_err(|e| LlmError::StreamError(format!("SSE data schema error: {}", e)))?;

    // Content-filter metadata arrives as chunks with no choices.
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);

    Ok(match text {
        Some(text) => StreamEvent::Text(text),
        None => StreamEvent::Skip,
    })
}

#[async_trait]
impl ChatModel for AzureOpenAiProvider {
    async fn complete(&self, mut request: ChatRequest) -> Result<AssistantMessage, LlmError> {
        request.stream = false;
        let response = self.send(&request).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(LlmError::ResponseError("No choices in response".to_string()));
        };

        Ok(AssistantMessage {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }

    async fn stream(&self, mut request: ChatRequest) -> Result<TextStream, LlmError> {
        request.stream = true;
        let response = self.send(&request).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(event) => parse_stream_event(&event.data),
                Err(e) => {
                    warn!("Azure OpenAI SSE stream error: {}", e);
                    Err(LlmError::StreamError(e.to_string()))
                }
            })
            .take_while(|event| future::ready(!matches!(event, Ok(StreamEvent::Done))))
            .filter_map(|event| {
                future::ready(match event {
                    Ok(StreamEvent::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
            });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::ChatMessage;
    use crate::llm::CompletionOptions;
    use futures::TryStreamExt;
    use mockito::Matcher;
    use serde_json::json;

    const PATH: &str = "/openai/deployments/gpt-4o/chat/completions";

    fn provider(endpoint: String) -> AzureOpenAiProvider {
        AzureOpenAiProvider::new(&LlmConfig {
            endpoint,
            deployment: "gpt-4o".to_string(),
            api_key: "secret".to_string(),
            api_version: "2024-05-01-preview".to_string(),
            temperature: 0.0,
            seed: 42,
            max_tokens: 800,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![ChatMessage::user("hello")], &CompletionOptions::default())
    }

    #[test]
    fn url_joins_endpoint_deployment_and_version() {
        assert_eq!(
            completions_url("https://x.openai.azure.com/", "gpt-4o", "2024-05-01-preview"),
            "https://x.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-05-01-preview"
        );
    }

    #[tokio::test]
    async fn complete_reads_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                "2024-05-01-preview".into(),
            ))
            .match_header("api-key", "secret")
            .match_body(Matcher::PartialJson(json!({"stream": false, "seed": 42})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Hi there!"}}]}"#)
            .create_async()
            .await;

        let reply = provider(server.url()).complete(request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(reply, AssistantMessage::text("Hi there!"));
    }

    #[tokio::test]
    async fn complete_returns_tool_calls() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
                    {"id":"call_9","type":"function","function":{"name":"Greeting","arguments":"{\"input\":\"hi\"}"}}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let reply = provider(server.url()).complete(request()).await.unwrap();

        assert_eq!(reply.content, None);
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].function.name, "Greeting");
    }

    #[tokio::test]
    async fn error_status_becomes_response_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let err = provider(server.url()).complete(request()).await.unwrap_err();

        match err {
            LlmError::ResponseError(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = provider(server.url()).complete(request()).await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(_)));
    }

    #[tokio::test]
    async fn stream_yields_deltas_until_done() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[],\"prompt_filter_results\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"There were \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"42 calls.\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .match_body(Matcher::PartialJson(json!({"stream": true})))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let chunks: Vec<String> = provider(server.url())
            .stream(request())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks, vec!["There were ".to_string(), "42 calls.".to_string()]);
    }

    #[tokio::test]
    async fn stream_surfaces_inline_errors() {
        let mut server = mockito::Server::new_async().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"content filtered\"}}\n\n",
        );
        server
            .mock("POST", PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let mut stream = provider(server.url()).stream(request()).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        match stream.next().await.unwrap() {
            Err(LlmError::StreamError(msg)) => assert_eq!(msg, "content filtered"),
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let result = AzureOpenAiProvider::new(&LlmConfig {
            endpoint: "https://x.openai.azure.com".to_string(),
            deployment: "gpt-4o".to_string(),
            api_key: " ".to_string(),
            api_version: "2024-05-01-preview".to_string(),
            temperature: 0.0,
            seed: 42,
            max_tokens: 800,
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(LlmError::ConfigError(_))));
    }
}
