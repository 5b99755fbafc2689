//! The agent control loop.
//!
//! Drives a thread through `Select -> {DoneFinal, Clarify, Fill}`,
//! `Fill -> Dispatch -> Select`, yielding a full thread snapshot after
//! every state transition so a caller can persist, stream, or cancel
//! between steps.
//!
//! Rust has no native generators, so "yield after every transition" is
//! implemented as a channel of snapshots fed by a background `tokio` task,
//! matching the corpus's own preference for channel-of-snapshots over a
//! write-once-return loop.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agentcore::error::AgentError;
use crate::agentcore::event::{Event, EventType, Thread};
use crate::agentcore::gateway::StructuredLlmGateway;
use crate::agentcore::registry::ToolRegistry;

/// Static configuration for one agent loop.
pub struct AgentLoopConfig {
    pub model: String,
    pub system_prompt: String,
    /// If set, the loop summarizes the thread before doing anything else
    /// whenever its event count exceeds this threshold.
    pub max_events_before_summarization: Option<usize>,
}

/// How a loop run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentLoopOutcome {
    /// The model reported the task complete; a final response was
    /// synthesized and appended.
    DoneFinal,
    /// The model needs clarification from a human. The thread is
    /// resumable: append a new `user_input` event and call `run` again.
    Clarify,
}

impl AgentLoopOutcome {
    /// Read the outcome of a completed run off a thread's last event, or
    /// `None` if the thread doesn't end in either terminal state (e.g. it's
    /// mid-run, or the run ended with an error that was never appended).
    pub fn from_thread(thread: &Thread) -> Option<Self> {
        let last = thread.events.last()?;
        if last.event_type != EventType::LlmResponse {
            return None;
        }
        match last.data.get("intent").and_then(Value::as_str) {
            Some("final_response") => Some(AgentLoopOutcome::DoneFinal),
            Some("clarification") => Some(AgentLoopOutcome::Clarify),
            _ => None,
        }
    }
}

/// A stream of thread snapshots, one per state transition, terminated by
/// either a final `Ok` snapshot (whose last event reflects `DoneFinal` or
/// `Clarify`) or an `Err` if the loop failed partway through. The `Err`
/// variant carries the thread as it stood at the moment of failure —
/// including any event (e.g. a `tool_call`) appended just before the
/// failing step — so a caller can persist that partial state before
/// re-raising or abandoning the run.
pub struct AgentLoopStream {
    inner: ReceiverStream<Result<Thread, (Thread, AgentError)>>,
}

impl tokio_stream::Stream for AgentLoopStream {
    type Item = Result<Thread, (Thread, AgentError)>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

const DEFAULT_SUMMARIZATION_TAIL_LEN: usize = 5;

/// The agent control loop: a tool registry, a structured LLM gateway, and
/// the loop's own configuration.
pub struct AgentLoop {
    registry: Arc<ToolRegistry>,
    gateway: Arc<StructuredLlmGateway>,
    config: AgentLoopConfig,
    summarization_tail_len: usize,
}

impl AgentLoop {
    pub fn new(
        registry: Arc<ToolRegistry>,
        gateway: Arc<StructuredLlmGateway>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            registry,
            gateway,
            config,
            summarization_tail_len: DEFAULT_SUMMARIZATION_TAIL_LEN,
        }
    }

    pub fn with_summarization_tail_len(mut self, len: usize) -> Self {
        self.summarization_tail_len = len;
        self
    }

    /// Start (or resume) a loop run over `thread`. Returns immediately; the
    /// loop body runs on a background task and feeds snapshots into the
    /// returned stream.
    pub fn run(self: Arc<Self>, thread: Thread) -> AgentLoopStream {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            let _ = self.drive(thread, tx).await;
        });
        AgentLoopStream {
            inner: ReceiverStream::new(rx),
        }
    }

    async fn drive(
        &self,
        mut thread: Thread,
        tx: mpsc::Sender<Result<Thread, (Thread, AgentError)>>,
    ) -> Result<(), ()> {
        if let Some(max) = self.config.max_events_before_summarization {
            if thread.events.len() > max {
                if let Err(e) = self.summarize(&mut thread).await {
                    return fail(&tx, thread, e).await;
                }
            }
        }
        if yield_snapshot(&tx, &thread).await.is_err() {
            return Err(());
        }

        loop {
            let tool_names = self.registry.tool_names().await;

            if let Err(e) = self.select(&mut thread, &tool_names).await {
                return fail(&tx, thread, e).await;
            }
            if yield_snapshot(&tx, &thread).await.is_err() {
                return Err(());
            }

            let intent = last_event_intent(&thread);
            match intent.as_deref() {
                Some("done") => {
                    if let Err(e) = self.finalize(&mut thread).await {
                        return fail(&tx, thread, e).await;
                    }
                    let _ = tx.send(Ok(thread)).await;
                    return Ok(());
                }
                Some("clarification") => {
                    let _ = tx.send(Ok(thread)).await;
                    return Ok(());
                }
                Some(name) if tool_names.iter().any(|n| n == name) => {
                    let name = name.to_string();

                    if let Err(e) = self.fill(&mut thread, &name).await {
                        return fail(&tx, thread, e).await;
                    }
                    if yield_snapshot(&tx, &thread).await.is_err() {
                        return Err(());
                    }

                    if let Err(e) = self.dispatch(&mut thread, &name).await {
                        return fail(&tx, thread, e).await;
                    }
                    if yield_snapshot(&tx, &thread).await.is_err() {
                        return Err(());
                    }
                }
                other => {
                    let name = other.unwrap_or("<missing>").to_string();
                    return fail(&tx, thread, AgentError::InvalidSelection(name)).await;
                }
            }
        }
    }

    async fn select(&self, thread: &mut Thread, tool_names: &[String]) -> Result<(), AgentError> {
        let mut intents: Vec<Value> = tool_names.iter().map(|n| json!(n)).collect();
        intents.push(json!("done"));
        intents.push(json!("clarification"));

        let schema = json!({
            "type": "object",
            "properties": {
                "intent": { "type": "string", "enum": intents },
                "reason": { "type": "string" }
            },
            "required": ["intent"]
        });

        let instruction = "Based on the conversation and any tool results so far, select the next \
            tool by name, or respond with 'done' if the task is complete, or \
            'clarification' if you need more information from the user. Don't call a \
            tool unless it's actually needed to answer the request. Respond with one \
            of the enumerated intents only.";

        self.gateway
            .run_structured(instruction, Some(thread), None, &schema, Some("tool_selection"))
            .await?;
        Ok(())
    }

    async fn fill(&self, thread: &mut Thread, tool_name: &str) -> Result<(), AgentError> {
        let tool_schema = self
            .registry
            .derived_schema(tool_name)
            .await
            .ok_or_else(|| AgentError::UnknownTool(tool_name.to_string()))?;

        let schema = json!({
            "type": "object",
            "properties": {
                "intent": { "const": tool_name },
                "arguments": tool_schema
            },
            "required": ["intent", "arguments"]
        });

        let instruction = format!(
            "You have selected the tool '{tool}'. Considering the full conversation \
             history and the most recent tool result, supply only the required \
             parameters for '{tool}' as per its schema. If the request implies using \
             a previous tool's result, use that result as an input.",
            tool = tool_name
        );

        self.gateway
            .run_structured(&instruction, Some(thread), None, &schema, Some("llm_parameters"))
            .await?;
        Ok(())
    }

    async fn dispatch(&self, thread: &mut Thread, tool_name: &str) -> Result<(), AgentError> {
        let arguments = last_event_field(&thread, "arguments").unwrap_or(Value::Null);

        thread.add_event(
            EventType::ToolCall,
            json!({ "intent": tool_name, "arguments": arguments.clone() }),
            None,
        );

        let result = self.registry.execute(tool_name, arguments).await?;
        let normalized = crate::agentcore::registry::normalize_result(result.raw_result);

        thread.add_event(
            EventType::ToolResponse,
            json!({ "response": normalized, "source": "ToolRegistry" }),
            None,
        );
        Ok(())
    }

    async fn finalize(&self, thread: &mut Thread) -> Result<(), AgentError> {
        let schema = json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" },
                "summary": { "type": "string" }
            },
            "required": ["message"]
        });

        let instruction = "Based on the conversation history and tool execution results, \
            write a clear, concise response to the user's original request, \
            summarizing the key findings in a user-friendly way.";

        let response = self
            .gateway
            .run_structured(instruction, Some(thread), None, &schema, None)
            .await?;
        // `run_structured` just appended this response as a plain llm_response
        // event; pop it back off before rebuilding the event log around it
        // with the full final_response shape (same trick `summarize` uses).
        thread.events.pop();

        let mut raw_results = serde_json::Map::new();
        for event in &thread.events {
            if matches!(event.event_type, EventType::UserInput | EventType::ToolResponse) {
                let key = match event.event_type {
                    EventType::UserInput => "user_input",
                    EventType::ToolResponse => "tool_response",
                    _ => unreachable!(),
                };
                raw_results.insert(key.to_string(), event.data.clone());
            }
        }

        let mut data = serde_json::Map::new();
        data.insert("intent".to_string(), json!("final_response"));
        data.insert("message".to_string(), response["message"].clone());
        if let Some(summary) = response.get("summary") {
            data.insert("summary".to_string(), summary.clone());
        }
        data.insert("raw_results".to_string(), Value::Object(raw_results));

        thread.add_event(EventType::LlmResponse, Value::Object(data), Some("final_response"));
        Ok(())
    }

    /// Replace the thread's events in place with a single `context_summary`
    /// event followed by the last `summarization_tail_len` events. The only
    /// operation in this crate that removes events from a thread.
    async fn summarize(&self, thread: &mut Thread) -> Result<(), AgentError> {
        let schema = json!({
            "type": "object",
            "properties": { "summary": { "type": "string" } },
            "required": ["summary"]
        });
        let instruction = "Summarize the conversation so far in a few sentences, preserving \
            any facts or results a continuation of this task would need.";

        let response = self
            .gateway
            .run_structured(instruction, Some(thread), None, &schema, None)
            .await?;
        // `run_structured` just appended the summary as a normal llm_response
        // event; pop it back off before rebuilding the event log around it.
        thread.events.pop();

        let summary_text = response
            .get("summary")
            .cloned()
            .unwrap_or_else(|| json!(""));

        let tail_start = thread.events.len().saturating_sub(self.summarization_tail_len);
        let tail: Vec<Event> = thread.events.split_off(tail_start);

        thread.events = vec![Event::new(EventType::ContextSummary, summary_text, None)];
        thread.events.extend(tail);

        log::info!("thread summarized; {} events remain", thread.events.len());
        Ok(())
    }
}

fn last_event_intent(thread: &Thread) -> Option<String> {
    last_event_field(thread, "intent").and_then(|v| v.as_str().map(str::to_owned))
}

fn last_event_field(thread: &Thread, field: &str) -> Option<Value> {
    thread
        .events
        .last()?
        .data
        .as_object()?
        .get(field)
        .cloned()
}

async fn yield_snapshot(
    tx: &mpsc::Sender<Result<Thread, (Thread, AgentError)>>,
    thread: &Thread,
) -> Result<(), ()> {
    tx.send(Ok(thread.clone())).await.map_err(|_| ())
}

/// Send a failure paired with the thread exactly as it stood at the moment
/// of failure (including any event appended earlier in the same step, e.g.
/// `dispatch`'s `tool_call`), so the caller never loses partial state.
async fn fail(
    tx: &mpsc::Sender<Result<Thread, (Thread, AgentError)>>,
    thread: Thread,
    error: AgentError,
) -> Result<(), ()> {
    let _ = tx.send(Err((thread, error))).await;
    Err(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agentcore::gateway::{GatewayMessage, StructuredLlmClient};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;
    use tokio_stream::StreamExt;

    struct ScriptedClient {
        responses: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl StructuredLlmClient for ScriptedClient {
        async fn create(
            &self,
            _messages: &[GatewayMessage],
            _schema: &Value,
            _temperature: f32,
        ) -> Result<Value, AgentError> {
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                return Err(AgentError::LlmError("scripted client exhausted".into()));
            }
            Ok(responses.remove(0))
        }
        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn make_loop(responses: Vec<Value>, registry: Arc<ToolRegistry>) -> Arc<AgentLoop> {
        make_loop_with_summarization(responses, registry, None)
    }

    fn make_loop_with_summarization(
        responses: Vec<Value>,
        registry: Arc<ToolRegistry>,
        max_events_before_summarization: Option<usize>,
    ) -> Arc<AgentLoop> {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(responses),
        });
        let gateway = Arc::new(StructuredLlmGateway::new(client, "You are an agent.", registry.clone()));
        let config = AgentLoopConfig {
            model: "test-model".to_string(),
            system_prompt: "You are an agent.".to_string(),
            max_events_before_summarization,
        };
        Arc::new(
            AgentLoop::new(registry, gateway, config).with_summarization_tail_len(5),
        )
    }

    #[tokio::test]
    async fn single_step_dispatch_then_done() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register_local(
                "add",
                "Adds two numbers",
                vec![
                    crate::agentcore::registry::ToolParameter::new(
                        "a",
                        crate::agentcore::registry::ToolParameterType::Number,
                    )
                    .required(),
                    crate::agentcore::registry::ToolParameter::new(
                        "b",
                        crate::agentcore::registry::ToolParameterType::Number,
                    )
                    .required(),
                ],
                Arc::new(|args| {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    Ok(json!({ "result": a + b }))
                }),
            )
            .await;

        let agent_loop = make_loop(
            vec![
                json!({"intent": "add"}),
                json!({"intent": "add", "arguments": {"a": 2, "b": 3}}),
                json!({"intent": "done"}),
                json!({"message": "The result is 5."}),
            ],
            registry,
        );

        let mut thread = Thread::new();
        thread.add_event(EventType::UserInput, json!("what is 2 + 3?"), None);

        let mut stream = agent_loop.run(thread);
        let mut last = None;
        while let Some(snapshot) = stream.next().await {
            last = Some(snapshot.unwrap());
        }
        let thread = last.unwrap();

        assert!(thread
            .events
            .iter()
            .any(|e| e.event_type == EventType::ToolResponse));
        let final_event = thread.events.last().unwrap();
        assert_eq!(final_event.step.as_deref(), Some("final_response"));
        assert_eq!(final_event.data["intent"], json!("final_response"));
        assert_eq!(AgentLoopOutcome::from_thread(&thread), Some(AgentLoopOutcome::DoneFinal));
    }

    #[tokio::test]
    async fn clarification_terminates_without_final_response() {
        let registry = Arc::new(ToolRegistry::new());
        let agent_loop = make_loop(vec![json!({"intent": "clarification"})], registry);

        let mut thread = Thread::new();
        thread.add_event(EventType::UserInput, json!("do the thing"), None);

        let mut stream = agent_loop.run(thread);
        let mut last = None;
        while let Some(snapshot) = stream.next().await {
            last = Some(snapshot.unwrap());
        }
        let thread = last.unwrap();
        assert!(thread.awaiting_human_response());
        assert_eq!(AgentLoopOutcome::from_thread(&thread), Some(AgentLoopOutcome::Clarify));
    }

    #[tokio::test]
    async fn unregistered_tool_name_surfaces_invalid_selection() {
        let registry = Arc::new(ToolRegistry::new());
        let agent_loop = make_loop(vec![json!({"intent": "not_a_real_tool"})], registry);

        let mut thread = Thread::new();
        thread.add_event(EventType::UserInput, json!("hi"), None);

        let mut stream = agent_loop.run(thread);
        let mut saw_error = false;
        while let Some(snapshot) = stream.next().await {
            if let Err((partial_thread, AgentError::InvalidSelection(_))) = snapshot {
                saw_error = true;
                assert!(partial_thread
                    .events
                    .iter()
                    .any(|e| e.event_type == EventType::UserInput));
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn dispatch_failure_preserves_the_tool_call_event_appended_just_before_it() {
        let registry = Arc::new(ToolRegistry::new());
        registry
            .register_local(
                "explode",
                "Always fails",
                vec![],
                Arc::new(|_| Err(AgentError::ToolExecutionError("boom".into()))),
            )
            .await;

        let agent_loop = make_loop(
            vec![
                json!({"intent": "explode"}),
                json!({"intent": "explode", "arguments": {}}),
            ],
            registry,
        );

        let mut thread = Thread::new();
        thread.add_event(EventType::UserInput, json!("please explode"), None);

        let mut stream = agent_loop.run(thread);
        let mut saw_error = false;
        while let Some(snapshot) = stream.next().await {
            if let Err((partial_thread, AgentError::ToolExecutionError(_))) = snapshot {
                saw_error = true;
                // The tool_call event is appended before dispatch invokes the
                // executor, so it must survive into the error's thread even
                // though the executor itself failed.
                assert!(partial_thread
                    .events
                    .iter()
                    .any(|e| e.event_type == EventType::ToolCall));
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn summarization_triggers_before_select_when_threshold_exceeded() {
        let registry = Arc::new(ToolRegistry::new());
        let agent_loop = make_loop_with_summarization(
            vec![
                json!({"summary": "earlier chit-chat happened"}),
                json!({"intent": "done"}),
                json!({"message": "done"}),
            ],
            registry,
            Some(6),
        );

        let mut thread = Thread::new();
        for i in 0..10 {
            thread.add_event(EventType::UserInput, json!(format!("message {i}")), None);
        }

        let mut stream = agent_loop.run(thread);
        let first_snapshot = stream.next().await.unwrap().unwrap();
        assert_eq!(first_snapshot.events.len(), 6);
        assert_eq!(first_snapshot.events[0].event_type, EventType::ContextSummary);
    }
}
