use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use super::system::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::utils::sanitize_function_name;

/// Metadata for one registered catalog function, as returned by the registry
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionInfo {
    pub full_name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub input_params: FunctionParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionParams {
    #[serde(default)]
    pub parameters: Vec<FunctionParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionParameter {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// HTTP client for the catalog function registry.
///
/// Metadata is read from the catalog API; execution goes through the SQL
/// statement endpoint as a single-row SELECT against the configured warehouse.
/// Both services are opaque remote collaborators, this client only shapes
/// requests and decodes responses.
pub struct FunctionClient {
    host: String,
    token: String,
    warehouse_id: String,
    client: Client,
}

impl FunctionClient {
    pub fn new(host: String, token: String, warehouse_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            host,
            token,
            warehouse_id,
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        let host = env::var("DATABRICKS_HOST").context("DATABRICKS_HOST must be set")?;
        let token = env::var("DATABRICKS_TOKEN").context("DATABRICKS_TOKEN must be set")?;
        let warehouse_id =
            env::var("DATABRICKS_WAREHOUSE_ID").context("DATABRICKS_WAREHOUSE_ID must be set")?;

        Self::new(host, token, warehouse_id)
    }

    /// Fetch metadata for a fully qualified function name (`catalog.schema.function`)
    pub async fn get_function(&self, full_name: &str) -> Result<FunctionInfo> {
        let url = format!(
            "{}/api/2.1/unity-catalog/functions/{}",
            self.host.trim_end_matches('/'),
            full_name
        );

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let err_text = response.text().await.unwrap_or_default();
                Err(anyhow!(
                    "Failed to fetch function {}: {}: {}",
                    full_name,
                    status,
                    err_text
                ))
            }
        }
    }

    /// Execute a function with named arguments and return its scalar result
    pub async fn execute(&self, function: &FunctionInfo, arguments: &Value) -> Result<Value> {
        let args = arguments
            .as_object()
            .ok_or_else(|| anyhow!("Function arguments must be a JSON object"))?;

        let markers = function
            .input_params
            .parameters
            .iter()
            .map(|p| format!(":{}", p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "SELECT {}({}) AS result",
            quote_full_name(&function.full_name),
            markers
        );

        let mut parameters = Vec::new();
        for param in &function.input_params.parameters {
            let value = args
                .get(&param.name)
                .ok_or_else(|| anyhow!("Missing argument: {}", param.name))?;
            parameters.push(json!({
                "name": param.name,
                "value": render_argument(value),
                "type": param.type_name,
            }));
        }

        let url = format!(
            "{}/api/2.0/sql/statements",
            self.host.trim_end_matches('/')
        );
        let payload = json!({
            "statement": statement,
            "warehouse_id": self.warehouse_id,
            "parameters": parameters,
            "wait_timeout": "30s",
        });

        tracing::debug!(function = %function.full_name, "executing catalog function");
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
            return Err(anyhow!("Statement request failed: {}: {}", status, err_text));
        }

        let body: Value = response.json().await?;
        let state = body["status"]["state"].as_str().unwrap_or_default();
        if state != "SUCCEEDED" {
            let message = body["status"]["error"]["message"]
                .as_str()
                .unwrap_or("statement did not succeed");
            return Err(anyhow!(
                "Execution of {} failed ({}): {}",
                function.full_name,
                state,
                message
            ));
        }

        let cell = body["result"]["data_array"][0][0].clone();
        if cell.is_null() {
            return Err(anyhow!(
                "Execution of {} returned no result",
                function.full_name
            ));
        }
        Ok(cell)
    }
}

fn quote_full_name(full_name: &str) -> String {
    full_name
        .split('.')
        .map(|part| format!("`{}`", part))
        .collect::<Vec<_>>()
        .join(".")
}

/// SQL statement parameters are passed as strings regardless of declared type
fn render_argument(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map a SQL parameter type to the JSON schema type advertised to the model
fn json_schema_type(type_name: &str) -> &'static str {
    match type_name.to_uppercase().as_str() {
        "DOUBLE" | "FLOAT" | "DECIMAL" => "number",
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "LONG" => "integer",
        "BOOLEAN" => "boolean",
        _ => "string",
    }
}

fn function_to_tool(info: &FunctionInfo) -> Tool {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for param in &info.input_params.parameters {
        let mut schema = serde_json::Map::new();
        schema.insert("type".into(), json!(json_schema_type(&param.type_name)));
        if let Some(comment) = &param.comment {
            schema.insert("description".into(), json!(comment));
        }
        properties.insert(param.name.clone(), Value::Object(schema));
        required.push(param.name.clone());
    }

    Tool::new(
        sanitize_function_name(&info.full_name),
        info.comment
            .clone()
            .unwrap_or_else(|| format!("Call the {} function", info.full_name)),
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    )
}

/// A system exposing registered catalog functions as agent tools.
///
/// Descriptors are derived from registry metadata once at startup; dispatch
/// maps the sanitized tool name back to the fully qualified function name.
pub struct FunctionSystem {
    client: FunctionClient,
    tools: Vec<Tool>,
    functions: HashMap<String, FunctionInfo>,
}

impl FunctionSystem {
    pub async fn new(client: FunctionClient, function_names: &[String]) -> Result<Self> {
        let mut tools = Vec::new();
        let mut functions = HashMap::new();

        for full_name in function_names {
            let info = client.get_function(full_name).await?;
            let tool = function_to_tool(&info);
            functions.insert(tool.name.clone(), info);
            tools.push(tool);
        }

        Ok(Self {
            client,
            tools,
            functions,
        })
    }
}

#[async_trait]
impl System for FunctionSystem {
    fn name(&self) -> &str {
        "functions"
    }

    fn description(&self) -> &str {
        "Executes governed catalog functions registered in the function registry"
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let info = self
            .functions
            .get(&tool_call.name)
            .ok_or_else(|| AgentError::ToolNotFound(tool_call.name.clone()))?;

        if !tool_call.arguments.is_object() {
            return Err(AgentError::InvalidParameters(format!(
                "Arguments for {} must be a JSON object",
                tool_call.name
            )));
        }

        let result = self
            .client
            .execute(info, &tool_call.arguments)
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;

        Ok(vec![Content::text(match result {
            Value::String(s) => s,
            other => other.to_string(),
        })])
    }
}
