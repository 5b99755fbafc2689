//! Conversation state: the append-only event log and the thread it belongs
//! to.
//!
//! This is the durable record the rest of the agent core operates on. Every
//! state transition the [`AgentLoop`](crate::AgentLoop) makes is recorded as
//! one more [`Event`] appended to a [`Thread`]; nothing is ever mutated in
//! place except during summarization, which is the one operation allowed to
//! remove events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::agentcore::error::AgentError;

/// The kind of a conversation event.
///
/// Serializes to the lowercase snake_case wire names used by the thread
/// snapshot format (`user_input`, `llm_response`, `tool_call`,
/// `tool_response`, `context_summary`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UserInput,
    LlmResponse,
    ToolCall,
    ToolResponse,
    ContextSummary,
}

/// A single entry in a thread's event log.
///
/// `data` is left as a `serde_json::Value` rather than a closed enum
/// because its shape varies by `event_type` and the exact shapes are a
/// contract between the agent loop and the gateway, not something outside
/// callers need a typed view into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub data: Value,
}

impl Event {
    pub fn new(event_type: EventType, data: Value, step: Option<String>) -> Self {
        Self {
            event_type,
            step,
            data,
        }
    }

    fn intent(&self) -> Option<&str> {
        self.data.as_object()?.get("intent")?.as_str()
    }
}

/// An append-only conversation: a globally unique id, an ordered event log,
/// and free-form metadata.
///
/// `thread_id` is immutable after construction. `events` is append-only
/// except for the in-place replacement summarization performs. Event order
/// is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    thread_id: Uuid,
    pub events: Vec<Event>,
    pub metadata: HashMap<String, Value>,
}

impl Thread {
    /// Start a new, empty thread. Generates a fresh UUIDv4 id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Start a new, empty thread with a caller-supplied id.
    pub fn with_id(thread_id: Uuid) -> Self {
        Self {
            thread_id,
            events: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn thread_id(&self) -> Uuid {
        self.thread_id
    }

    /// Append a new event. The only way to grow a thread's event log.
    pub fn add_event(&mut self, event_type: EventType, data: Value, step: Option<&str>) {
        log::debug!("event appended: {:?}", event_type);
        self.events
            .push(Event::new(event_type, data, step.map(str::to_owned)));
    }

    /// True iff the last event is an `llm_response` whose data carries
    /// `intent == "clarification"`.
    pub fn awaiting_human_response(&self) -> bool {
        match self.events.last() {
            Some(event) => {
                event.event_type == EventType::LlmResponse
                    && event.intent() == Some("clarification")
            }
            None => false,
        }
    }

    /// True iff the last event's data carries a truthy `requires_approval`
    /// field. Lets a tool flag its own result as needing a human approval
    /// gate without overloading [`awaiting_human_response`](Self::awaiting_human_response).
    pub fn awaiting_human_approval(&self) -> bool {
        match self.events.last() {
            Some(event) => event
                .data
                .as_object()
                .and_then(|obj| obj.get("requires_approval"))
                .and_then(Value::as_bool)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Set a value in the thread's free-form metadata.
    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        log::debug!("context updated: {}", key);
        self.metadata.insert(key, value);
    }

    /// Read a value from the thread's free-form metadata.
    pub fn get_context(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Caller-facing sanity check: every event has a non-empty type and
    /// non-null data. Never invoked by the loop itself; never panics.
    pub fn validate(&self) -> bool {
        if self.events.is_empty() {
            log::warn!("thread {} has no events", self.thread_id);
            return false;
        }
        for event in &self.events {
            if event.data.is_null() {
                log::error!("thread {} has an event with null data", self.thread_id);
                return false;
            }
        }
        true
    }

    /// Serialize to the thread snapshot wire format described in the
    /// external interfaces section of the spec.
    pub fn to_serialized(&self) -> Result<String, AgentError> {
        serde_json::to_string(self).map_err(AgentError::from)
    }

    /// Reconstruct a thread from its serialized snapshot. Round-trips
    /// losslessly with [`to_serialized`](Self::to_serialized): same event
    /// list, types, step labels, and data.
    pub fn from_serialized(snapshot: &str) -> Result<Self, AgentError> {
        serde_json::from_str(snapshot).map_err(AgentError::from)
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}
