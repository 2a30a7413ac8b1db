use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required configuration value `{0}`")]
    Missing(&'static str),
    #[error("invalid configuration value `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
    pub temperature: f32,
    pub seed: u64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index: String,
    pub semantic_configuration: String,
    pub embedding_deployment: String,
    pub strictness: u8,
    pub top_n_documents: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamingConfig {
    pub pacing_ms: u64,
}

impl StreamingConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub web: WebConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub streaming: StreamingConfig,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to the DuckDB database file
    #[arg(long)]
    pub database: Option<String>,
}

// Variable names used by the existing deployment scripts.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("SQLDB_DATABASE", "database.path"),
    ("AZURE_OPEN_AI_ENDPOINT", "llm.endpoint"),
    ("AZURE_OPEN_AI_DEPLOYMENT_MODEL", "llm.deployment"),
    ("AZURE_OPEN_AI_API_KEY", "llm.api_key"),
    ("OPEN_AI_API_VERSION", "llm.api_version"),
    ("AZURE_AI_SEARCH_ENDPOINT", "search.endpoint"),
    ("AZURE_AI_SEARCH_API_KEY", "search.api_key"),
    ("AZURE_AI_SEARCH_INDEX", "search.index"),
];

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        Self::load(args, std::env::vars().collect())
    }

    /// Builds and validates the configuration from an explicit environment map.
    pub fn load(args: &CliArgs, env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder()
            .set_default("web.host", "0.0.0.0")?
            .set_default("web.port", 8000)?
            .set_default("database.path", "")?
            .set_default("database.pool_size", 4)?
            .set_default("llm.endpoint", "")?
            .set_default("llm.deployment", "")?
            .set_default("llm.api_key", "")?
            .set_default("llm.api_version", "")?
            .set_default("llm.temperature", 0.0)?
            .set_default("llm.seed", 42)?
            .set_default("llm.max_tokens", 800)?
            .set_default("llm.timeout_secs", 60)?
            .set_default("search.endpoint", "")?
            .set_default("search.api_key", "")?
            .set_default("search.index", "")?
            .set_default("search.semantic_configuration", "my-semantic-config")?
            .set_default("search.embedding_deployment", "text-embedding-ada-002")?
            .set_default("search.strictness", 3)?
            .set_default("search.top_n_documents", 5)?
            .set_default("streaming.pacing_ms", 100)?;

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/km-api/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix("KM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (name, key) in LEGACY_ENV {
            let value = env.get(*name).filter(|v| !v.trim().is_empty()).cloned();
            config_builder = config_builder.set_override_option(*key, value)?;
        }

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(database) = &args.database {
            config.database.path = database.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("web.host", &self.web.host),
            ("database.path", &self.database.path),
            ("llm.endpoint", &self.llm.endpoint),
            ("llm.deployment", &self.llm.deployment),
            ("llm.api_key", &self.llm.api_key),
            ("llm.api_version", &self.llm.api_version),
            ("search.endpoint", &self.search.endpoint),
            ("search.api_key", &self.search.api_key),
            ("search.index", &self.search.index),
            ("search.embedding_deployment", &self.search.embedding_deployment),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        check_url("llm.endpoint", &self.llm.endpoint)?;
        check_url("search.endpoint", &self.search.endpoint)?;

        if self.database.pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "database.pool_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(1..=5).contains(&self.search.strictness) {
            return Err(ConfigError::Invalid {
                key: "search.strictness",
                reason: format!("{} is outside 1..=5", self.search.strictness),
            });
        }

        Ok(())
    }
}

fn check_url(key: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme `{}`", other),
        }),
    }
}
