//! The error taxonomy for the agent core.
//!
//! There are no retries anywhere in this crate: every fallible operation
//! either succeeds or returns one of these variants to the caller. Events
//! already appended to a thread before a failure are left in place, so a
//! caller can persist the partial thread before deciding whether to resume
//! or abandon it.

use thiserror::Error;

/// The full error taxonomy surfaced by the agent core.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Dispatch was attempted against a tool name the registry has never
    /// seen.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The model selected an intent that is not a registered tool name and
    /// not `done`/`clarification`. The schema handed to the provider should
    /// prevent this; this variant exists for providers that don't honor
    /// their schema.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// Arguments synthesized for a tool do not satisfy its parameter
    /// schema (missing required parameter, wrong type).
    #[error("parameter validation failed for tool {tool}: {reason}")]
    ParameterValidation { tool: String, reason: String },

    /// An operation requiring a connected `RemoteToolConnection` was
    /// attempted while it was disconnected.
    #[error("remote tool connection is not connected")]
    NotConnected,

    /// The structured-output provider returned an error or a value that
    /// did not satisfy the requested schema.
    #[error("llm call failed: {0}")]
    LlmError(String),

    /// A local or remote tool executor returned an error.
    #[error("tool execution failed: {0}")]
    ToolExecutionError(String),

    /// A conversation store backend failed to read or write a snapshot.
    #[error("store i/o error: {0}")]
    StoreIoError(String),

    /// A thread snapshot could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::SerializationError(err.to_string())
    }
}
