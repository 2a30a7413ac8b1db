use std::sync::Arc;

use crate::config::SearchConfig;
use crate::llm::models::{
    AzureSearchParameters, ChatMessage, ChatRequest, DataSource, EmbeddingDependency,
    FieldsMapping, SearchAuthentication,
};
use crate::llm::{ChatModel, CompletionOptions, LlmError};

/// Index and retrieval settings for the call-transcript search index.
#[derive(Debug, Clone)]
pub struct AzureSearchSource {
    endpoint: String,
    index: String,
    api_key: String,
    semantic_configuration: String,
    embedding_deployment: String,
    strictness: u8,
    top_n_documents: u32,
}

impl From<&SearchConfig> for AzureSearchSource {
    fn from(config: &SearchConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            index: config.index.clone(),
            api_key: config.api_key.clone(),
            semantic_configuration: config.semantic_configuration.clone(),
            embedding_deployment: config.embedding_deployment.clone(),
            strictness: config.strictness,
            top_n_documents: config.top_n_documents,
        }
    }
}

impl AzureSearchSource {
    pub fn to_data_source(&self, role_information: &str) -> DataSource {
        DataSource::AzureSearch {
            parameters: AzureSearchParameters {
                endpoint: self.endpoint.clone(),
                index_name: self.index.clone(),
                semantic_configuration: self.semantic_configuration.clone(),
                query_type: "vector_simple_hybrid",
                fields_mapping: FieldsMapping {
                    content_fields_separator: "\n",
                    content_fields: vec!["content"],
                    filepath_field: "chunk_id",
                    title_field: "",
                    url_field: "sourceurl",
                    vector_fields: vec!["contentVector"],
                },
                in_scope: true,
                role_information: role_information.to_string(),
                strictness: self.strictness,
                top_n_documents: self.top_n_documents,
                authentication: SearchAuthentication::ApiKey {
                    key: self.api_key.clone(),
                },
                embedding_dependency: EmbeddingDependency::DeploymentName {
                    deployment_name: self.embedding_deployment.clone(),
                },
            },
        }
    }
}

/// Completions grounded on the search index. Retrieval happens inside the
/// hosted service; this client only attaches the data source.
#[derive(Clone)]
pub struct GroundedClient {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
    source: AzureSearchSource,
}

impl GroundedClient {
    pub fn new(model: Arc<dyn ChatModel>, options: CompletionOptions, source: AzureSearchSource) -> Self {
        Self {
            model,
            options,
            source,
        }
    }

    pub async fn complete_grounded(&self, system_prompt: &str, question: &str) -> Result<String, LlmError> {
        let request = ChatRequest::new(
            vec![ChatMessage::system(system_prompt), ChatMessage::user(question)],
            &self.options,
        )
        .with_data_source(self.source.to_data_source(system_prompt));

        let reply = self.model.complete(request).await?;
        reply
            .content
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}
