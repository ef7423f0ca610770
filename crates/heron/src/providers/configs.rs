use anyhow::{Context, Result};
use std::env;

/// Unified enum to wrap different provider configurations
pub enum ProviderConfig {
    Databricks(DatabricksProviderConfig),
    OpenAi(OpenAiProviderConfig),
}

/// Configuration for a chat model hosted on a Databricks style serving endpoint
pub struct DatabricksProviderConfig {
    pub host: String,
    pub token: String,
    /// Name of the serving endpoint, e.g. "databricks-claude-3-7-sonnet"
    pub endpoint: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl DatabricksProviderConfig {
    pub fn new(host: String, token: String, endpoint: String) -> Self {
        Self {
            host,
            token,
            endpoint,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let host = env::var("DATABRICKS_HOST").context("DATABRICKS_HOST must be set")?;
        let token = env::var("DATABRICKS_TOKEN").context("DATABRICKS_TOKEN must be set")?;
        let endpoint = env::var("LLM_ENDPOINT_NAME").context("LLM_ENDPOINT_NAME must be set")?;

        Ok(Self::new(host, token, endpoint))
    }
}

/// Configuration for an OpenAI compatible chat completion host
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn new(host: String, api_key: String, model: String) -> Self {
        Self {
            host,
            api_key,
            model,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let host =
            env::var("OPENAI_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;
        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        Ok(Self::new(host, api_key, model))
    }
}
