use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::env;
use std::time::Duration;

use super::system::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// HTTP client for a managed vector search index
pub struct VectorSearchClient {
    host: String,
    token: String,
    client: Client,
}

impl VectorSearchClient {
    pub fn new(host: String, token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            host,
            token,
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        let host = env::var("DATABRICKS_HOST").context("DATABRICKS_HOST must be set")?;
        let token = env::var("DATABRICKS_TOKEN").context("DATABRICKS_TOKEN must be set")?;

        Self::new(host, token)
    }

    /// Run a nearest-neighbor text query against an index, returning one map per hit row
    pub async fn query(
        &self,
        index_name: &str,
        query_text: &str,
        num_results: usize,
        columns: &[String],
        filters: Option<&Value>,
    ) -> Result<Vec<Map<String, Value>>> {
        let url = format!(
            "{}/api/2.0/vector-search/indexes/{}/query",
            self.host.trim_end_matches('/'),
            index_name
        );

        let mut payload = json!({
            "query_text": query_text,
            "num_results": num_results,
            "columns": columns,
        });
        if let Some(filters) = filters {
            payload["filters_json"] = json!(filters.to_string());
        }

        tracing::debug!(index = %index_name, "querying vector search index");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let err_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Index query failed: {}: {}", status, err_text));
        }

        let body: Value = response.json().await?;
        decode_rows(&body)
    }
}

/// Decode the columnar manifest/data_array response into row maps
fn decode_rows(body: &Value) -> Result<Vec<Map<String, Value>>> {
    let names: Vec<&str> = body["manifest"]["columns"]
        .as_array()
        .ok_or_else(|| anyhow!("Query response is missing the column manifest"))?
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();

    let empty = vec![];
    let data_array = body["result"]["data_array"].as_array().unwrap_or(&empty);

    let mut rows = Vec::new();
    for row in data_array {
        let cells = row
            .as_array()
            .ok_or_else(|| anyhow!("Malformed result row in query response"))?;
        let mut map = Map::new();
        for (name, cell) in names.iter().zip(cells) {
            map.insert((*name).to_string(), cell.clone());
        }
        rows.push(map);
    }

    Ok(rows)
}

/// Configuration for one retriever tool over one index
pub struct RetrievalConfig {
    pub index_name: String,
    pub tool_name: String,
    pub description: String,
    pub columns: Vec<String>,
    pub num_results: usize,
    pub filters: Option<Value>,
}

impl RetrievalConfig {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            tool_name: "search_index".to_string(),
            description: "Retrieves documents relevant to a natural language query".to_string(),
            columns: vec!["content".to_string()],
            num_results: 5,
            filters: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.tool_name = name.into();
        self.description = description.into();
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results;
        self
    }

    pub fn with_filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }
}

/// A system exposing a vector search index as a single retriever tool
pub struct RetrievalSystem {
    client: VectorSearchClient,
    config: RetrievalConfig,
    tools: Vec<Tool>,
}

impl RetrievalSystem {
    pub fn new(client: VectorSearchClient, config: RetrievalConfig) -> Self {
        let tools = vec![Tool::new(
            config.tool_name.clone(),
            config.description.clone(),
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The natural language query to search the index with"
                    }
                },
                "required": ["query"]
            }),
        )];

        Self {
            client,
            config,
            tools,
        }
    }
}

#[async_trait]
impl System for RetrievalSystem {
    fn name(&self) -> &str {
        "retrieval"
    }

    fn description(&self) -> &str {
        "Searches a vector index for documents relevant to a query"
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        if tool_call.name != self.config.tool_name {
            return Err(AgentError::ToolNotFound(tool_call.name));
        }

        let query = tool_call
            .arguments
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AgentError::InvalidParameters(
                    "The retriever requires a string `query` argument".to_string(),
                )
            })?;

        let rows = self
            .client
            .query(
                &self.config.index_name,
                query,
                self.config.num_results,
                &self.config.columns,
                self.config.filters.as_ref(),
            )
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| Content::data(Value::Object(row)))
            .collect())
    }
}
