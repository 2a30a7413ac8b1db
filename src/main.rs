use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod metrics;
mod orchestration;
mod skills;
mod util;
mod web;

#[cfg(test)]
mod test_support;

use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::build_pool;
use crate::db::schema::ensure_schema;
use crate::llm::completion::CompletionClient;
use crate::llm::grounded::{AzureSearchSource, GroundedClient};
use crate::llm::providers::azure::AzureOpenAiProvider;
use crate::llm::{ChatModel, CompletionOptions};
use crate::metrics::MetricsGateway;
use crate::orchestration::selector::ModelSelector;
use crate::orchestration::Orchestrator;
use crate::skills::greeting::GreetingSkill;
use crate::skills::sql_chat::SqlChatSkill;
use crate::skills::transcripts::TranscriptSkill;
use crate::skills::SkillRegistry;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let pool = build_pool(&config.database)?;
    ensure_schema(&*pool.get()?)?;

    info!(deployment = %config.llm.deployment, "Initializing Azure OpenAI provider");
    let model: Arc<dyn ChatModel> = Arc::new(AzureOpenAiProvider::new(&config.llm)?);
    let options = CompletionOptions::from(&config.llm);

    let completion = CompletionClient::new(model.clone(), options.clone());
    let grounded = GroundedClient::new(
        model.clone(),
        options.clone(),
        AzureSearchSource::from(&config.search),
    );
    let registry = SkillRegistry::new()
        .register(GreetingSkill::new(completion.clone()))
        .register(SqlChatSkill::new(completion, pool.clone()))
        .register(TranscriptSkill::new(grounded));

    let orchestrator = Orchestrator::new(
        Arc::new(ModelSelector::new(model.clone(), options.clone())),
        model,
        registry,
        options,
    );

    let app_state = Arc::new(AppState::new(
        MetricsGateway::new(pool),
        orchestrator,
        config.streaming.pacing(),
    ));

    // Start the web server
    info!("Starting knowledge mining API on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
