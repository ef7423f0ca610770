use anyhow::{bail, Result};
use futures::future;
use futures::stream::BoxStream;
use futures::TryStreamExt;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Provider;
use crate::systems::System;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with access to tools. \
Use the available tools when a question needs a calculation or a lookup rather than \
answering from memory, and explain what you used.";

/// Agent drives a conversation by alternating model completions and tool calls
///
/// The loop itself is unbounded: it runs until the model replies without tool
/// requests or the provider fails. Callers that need a safety bound impose one
/// by counting the messages they consume (see the CLI), and cancel a run by
/// dropping the reply stream, which stops the loop at its next await point.
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Box<dyn Provider>,
    system_prompt: String,
}

impl Agent {
    /// Create a new Agent with the specified provider and the default system prompt
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replace the system prompt sent with every completion
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// Get all tools from all systems with proper system prefixing
    fn get_prefixed_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        for system in &self.systems {
            for tool in system.tools() {
                tools.push(Tool::new(
                    format!("{}__{}", system.name(), tool.name),
                    &tool.description,
                    tool.parameters.clone(),
                ));
            }
        }
        tools
    }

    /// Find the appropriate system for a tool call based on the prefixed name
    fn get_system_for_tool(&self, prefixed_name: &str) -> Option<&dyn System> {
        let (system_name, _) = prefixed_name.split_once("__")?;
        self.systems
            .iter()
            .find(|sys| sys.name() == system_name)
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(
        &self,
        tool_call: AgentResult<ToolCall>,
    ) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let tool_name = call
            .name
            .split_once("__")
            .map(|(_, name)| name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;
        let system_tool_call = ToolCall::new(tool_name, call.arguments);

        tracing::debug!(system = system.name(), tool = tool_name, "dispatching tool call");
        system.call(system_tool_call).await
    }

    /// Create a stream that yields each message as it is produced by the agent.
    /// This includes both the assistant's responses and any tool result messages.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<Message>>> {
        if messages.is_empty() {
            bail!("A reply requires a conversation with at least one message");
        }

        let mut messages = messages.to_vec();
        let tools = self.get_prefixed_tools();
        let system_prompt = self.system_prompt.clone();

        Ok(Box::pin(async_stream::try_stream! {
            loop {
                // Get the next completion; the system prompt rides alongside the
                // history and is never stored into it
                let (response, usage) = self.provider.complete(
                    &system_prompt,
                    &messages,
                    &tools,
                ).await?;
                tracing::debug!(
                    input_tokens = ?usage.input_tokens,
                    output_tokens = ?usage.output_tokens,
                    "completion received"
                );

                yield response.clone();

                // Ensure the response is delivered before potentially
                // long-running tool executions start
                tokio::task::yield_now().await;

                let tool_requests: Vec<ToolRequest> = response
                    .tool_requests()
                    .into_iter()
                    .cloned()
                    .collect();

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    break;
                }

                // Dispatch all requests concurrently, then reassemble the
                // results in request order under their correlation ids
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();
                let outputs = future::join_all(futures).await;

                let mut tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    tool_response = tool_response.with_tool_response(request.id.clone(), output);
                }

                yield tool_response.clone();

                messages.push(response);
                messages.push(tool_response);
            }
        }))
    }

    /// Run the conversation to completion and return the extended message
    /// sequence, input messages first, then every produced message in order.
    ///
    /// Equivalent to draining [`Agent::reply`]; only the delivery timing differs.
    pub async fn run(&self, messages: &[Message]) -> Result<Vec<Message>> {
        let mut conversation = messages.to_vec();
        let mut stream = self.reply(messages).await?;
        while let Some(message) = stream.try_next().await? {
            conversation.push(message);
        }
        Ok(conversation)
    }
}
