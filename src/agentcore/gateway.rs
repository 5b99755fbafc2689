//! The structured LLM gateway: the single seam between the agent loop and
//! whatever model actually does the work.
//!
//! The provider itself is out of scope — [`StructuredLlmClient`] is the
//! narrow contract the loop needs: hand it messages and a JSON schema, get
//! back a value that satisfies the schema or an error. Everything about
//! prompt assembly (system prompt, tool catalog, event projection) lives
//! here, not in the provider.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agentcore::error::AgentError;
use crate::agentcore::event::{Event, EventType, Thread};
use crate::agentcore::registry::ToolRegistry;

/// The role of one message in a structured-output call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayRole {
    System,
    User,
    Assistant,
}

/// One message in a structured-output call.
#[derive(Debug, Clone)]
pub struct GatewayMessage {
    pub role: GatewayRole,
    pub content: String,
}

impl GatewayMessage {
    pub fn new(role: GatewayRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A structured-output LLM provider: given messages and a schema, returns
/// a value satisfying that schema, or an error.
///
/// Deliberately narrower than a full chat-completion client — no streaming,
/// no native tool-calls, no token usage tracking. Those concerns belong to
/// the provider binding, not the core.
#[async_trait]
pub trait StructuredLlmClient: Send + Sync {
    async fn create(
        &self,
        messages: &[GatewayMessage],
        response_schema: &Value,
        temperature: f32,
    ) -> Result<Value, AgentError>;

    fn model_name(&self) -> &str;
}

/// Builds prompts from thread state and a tool catalog, and drives a
/// [`StructuredLlmClient`] deterministically (`temperature = 0.0`) for
/// every call the agent loop needs to make.
pub struct StructuredLlmGateway {
    client: Arc<dyn StructuredLlmClient>,
    system_prompt: String,
    registry: Arc<ToolRegistry>,
}

impl StructuredLlmGateway {
    pub fn new(
        client: Arc<dyn StructuredLlmClient>,
        system_prompt: impl Into<String>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            registry,
        }
    }

    /// Run one structured-output call: compose messages from the thread's
    /// event history plus `prompt` as the final instruction, call the
    /// provider, and — if a thread was supplied — append the validated
    /// response as an `llm_response` event.
    pub async fn run_structured(
        &self,
        prompt: &str,
        thread: Option<&mut Thread>,
        extra_context: Option<&str>,
        schema: &Value,
        step: Option<&str>,
    ) -> Result<Value, AgentError> {
        let mut system_content = self.system_prompt.clone();
        let catalog = self.registry.catalog_text().await;
        if !catalog.is_empty() {
            system_content.push_str("\nAvailable tools:\n");
            system_content.push_str(&catalog);
        }
        if let Some(extra) = extra_context {
            system_content.push('\n');
            system_content.push_str(extra);
        }

        let mut messages = vec![GatewayMessage::new(GatewayRole::System, system_content)];
        if let Some(thread) = thread.as_deref() {
            messages.extend(project_events(thread.events.iter()));
        }
        messages.push(GatewayMessage::new(GatewayRole::User, prompt));

        let response = self
            .client
            .create(&messages, schema, 0.0)
            .await
            .map_err(|e| AgentError::LlmError(e.to_string()))?;

        if let Some(thread) = thread {
            thread.add_event(EventType::LlmResponse, response.clone(), step);
        }

        Ok(response)
    }
}

/// Project a thread's prior events into gateway chat messages, following
/// the original agent's message-building rules exactly:
/// - `user_input` → user message.
/// - `llm_response` carrying a tool-selection intent → assistant message
///   that is the bare intent word for `done`/`clarification`, or
///   `"Selected tool 'X' with parameters: Y"` otherwise.
/// - any other `llm_response` → assistant message with the raw data.
/// - `tool_response` → user message `"Tool execution result: ..."`.
/// - `context_summary` → user message carrying the summary text.
/// - `tool_call` is not itself projected; it's an internal bookkeeping
///   event, not part of what the model sees as conversation turns.
fn project_events<'a>(events: impl Iterator<Item = &'a Event>) -> Vec<GatewayMessage> {
    events.filter_map(project_one_event).collect()
}

fn project_one_event(event: &Event) -> Option<GatewayMessage> {
    match event.event_type {
        EventType::UserInput => Some(GatewayMessage::new(
            GatewayRole::User,
            render_value(&event.data),
        )),
        EventType::LlmResponse => {
            let obj = event.data.as_object();
            let intent = obj.and_then(|o| o.get("intent")).and_then(Value::as_str);
            match intent {
                Some(intent @ ("done" | "clarification")) => {
                    Some(GatewayMessage::new(GatewayRole::Assistant, intent))
                }
                Some(tool_name) => {
                    let arguments = obj
                        .and_then(|o| o.get("arguments"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    Some(GatewayMessage::new(
                        GatewayRole::Assistant,
                        format!(
                            "Selected tool '{}' with parameters: {}",
                            tool_name, arguments
                        ),
                    ))
                }
                None => Some(GatewayMessage::new(
                    GatewayRole::Assistant,
                    render_value(&event.data),
                )),
            }
        }
        EventType::ToolResponse => Some(GatewayMessage::new(
            GatewayRole::User,
            format!("Tool execution result: {}", render_value(&event.data)),
        )),
        EventType::ContextSummary => Some(GatewayMessage::new(
            GatewayRole::User,
            render_value(&event.data),
        )),
        EventType::ToolCall => None,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
