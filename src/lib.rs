// src/lib.rs

pub mod agentcore;

pub use agentcore::config::AgentCoreConfig;
pub use agentcore::error::AgentError;
pub use agentcore::event::{Event, EventType, Thread};
pub use agentcore::gateway::{GatewayMessage, GatewayRole, StructuredLlmClient, StructuredLlmGateway};
pub use agentcore::loop_::{AgentLoop, AgentLoopConfig, AgentLoopOutcome};
pub use agentcore::registry::{
    LocalTool, ToolDescriptor, ToolParameter, ToolParameterType, ToolRegistry, ToolResult,
};
pub use agentcore::remote::{
    with_connection, HttpToolConnection, RemoteToolConnection, RemoteToolListing,
    RemoteToolOutcome,
};
pub use agentcore::store::{
    ConversationStore, DocumentConversationStore, FileConversationStore, SqlConversationStore,
};
