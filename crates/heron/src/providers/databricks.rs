use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::DatabricksProviderConfig;
use super::utils::{
    check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
    tools_to_openai_spec,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// A provider backed by a model serving endpoint, addressed by endpoint name.
///
/// Serving endpoints speak the OpenAI chat completion shape on the wire, so the
/// payload conventions are shared with [`super::openai::OpenAiProvider`].
pub struct DatabricksProvider {
    client: Client,
    config: DatabricksProviderConfig,
}

impl DatabricksProvider {
    pub fn new(config: DatabricksProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Result<Usage> {
        let usage = data
            .get("usage")
            .ok_or_else(|| anyhow!("No usage data in response"))?;

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Ok(Usage::new(input_tokens, output_tokens, total_tokens))
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/serving-endpoints/{}/invocations",
            self.config.host.trim_end_matches('/'),
            self.config.endpoint
        );

        tracing::debug!(endpoint = %self.config.endpoint, "posting to serving endpoint");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(anyhow!("Server error: {}", status))
            }
            _ => {
                let status = response.status();
                let err_text = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}: {}", status, err_text))
            }
        }
    }
}

#[async_trait]
impl Provider for DatabricksProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        // Prepare messages and tools
        let messages_spec = messages_to_openai_spec(messages);
        let tools_spec = if !tools.is_empty() {
            tools_to_openai_spec(tools)?
        } else {
            vec![]
        };

        // Build payload with system message first
        let mut messages_array = vec![json!({ "role": "system", "content": system })];
        messages_array.extend(messages_spec);

        let mut payload = json!({ "messages": messages_array });

        // Add optional parameters
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }

        // Make request
        let response = self.post(payload).await?;

        // Raise specific error if context length is exceeded
        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("Serving endpoint error: {}", error));
        }

        // Parse response
        let message = openai_response_to_message(response.clone())?;
        let usage = Self::get_usage(&response)?;

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageContent;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_completion_with_token() -> Result<()> {
        let mock_server = MockServer::start().await;

        let mock_response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Hello!"
                }
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 25,
                "total_tokens": 35
            }
        });

        let system = "You are a helpful assistant.";
        let expected_request_body = json!({
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": "Hello"}
            ]
        });

        Mock::given(method("POST"))
            .and(path("/serving-endpoints/my-chat-endpoint/invocations"))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_json(expected_request_body.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = DatabricksProviderConfig::new(
            mock_server.uri(),
            "test_token".to_string(),
            "my-chat-endpoint".to_string(),
        );
        let provider = DatabricksProvider::new(config)?;

        let messages = vec![Message::user().with_text("Hello")];
        let (reply_message, reply_usage) = provider.complete(system, &messages, &[]).await?;

        if let MessageContent::Text(text) = &reply_message.content[0] {
            assert_eq!(text, "Hello!");
        } else {
            panic!("Expected Text content");
        }
        assert_eq!(reply_usage.total_tokens, Some(35));

        Ok(())
    }

    #[tokio::test]
    async fn test_completion_tool_request() -> Result<()> {
        let mock_server = MockServer::start().await;

        let mock_response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "functions__main_default_add_numbers",
                            "arguments": "{\"number_1\": 42, \"number_2\": 58}"
                        }
                    }]
                }
            }],
            "usage": {
                "prompt_tokens": 20,
                "completion_tokens": 10,
                "total_tokens": 30
            }
        });

        Mock::given(method("POST"))
            .and(path("/serving-endpoints/my-chat-endpoint/invocations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response))
            .mount(&mock_server)
            .await;

        let config = DatabricksProviderConfig::new(
            mock_server.uri(),
            "test_token".to_string(),
            "my-chat-endpoint".to_string(),
        );
        let provider = DatabricksProvider::new(config)?;

        let tool = Tool::new(
            "functions__main_default_add_numbers",
            "Add two numbers",
            json!({
                "type": "object",
                "properties": {
                    "number_1": {"type": "number"},
                    "number_2": {"type": "number"}
                },
                "required": ["number_1", "number_2"]
            }),
        );

        let messages = vec![Message::user().with_text("What is 42 + 58?")];
        let (reply, _) = provider
            .complete("You are a helpful assistant.", &messages, &[tool])
            .await?;

        let request = reply.tool_requests()[0];
        let tool_call = request.tool_call.as_ref().unwrap();
        assert_eq!(tool_call.name, "functions__main_default_add_numbers");
        assert_eq!(tool_call.arguments["number_1"], 42);

        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_surfaces() -> Result<()> {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/serving-endpoints/my-chat-endpoint/invocations"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let config = DatabricksProviderConfig::new(
            mock_server.uri(),
            "test_token".to_string(),
            "my-chat-endpoint".to_string(),
        );
        let provider = DatabricksProvider::new(config)?;

        let messages = vec![Message::user().with_text("Hello")];
        let result = provider.complete("system", &messages, &[]).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Server error"));

        Ok(())
    }
}
