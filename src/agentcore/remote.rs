//! The remote tool-protocol connection manager.
//!
//! Gives the tool registry a uniform client-side view of an external
//! tool-protocol server: connect/disconnect lifecycle, `list_tools`, and
//! `call_tool`. Building a concrete server is out of scope; this module
//! only consumes the contract.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::agentcore::error::AgentError;
use crate::agentcore::registry::ToolParameter;

/// A tool advertised by `list_tools`, before it's wrapped into a full
/// [`ToolDescriptor`](crate::ToolDescriptor).
#[derive(Debug, Clone)]
pub struct RemoteToolListing {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

/// The opaque result of `call_tool`: structured content, a display-text
/// rendering, or both — matching the remote tool-protocol server contract
/// exactly (`structured_content` and/or text blocks).
#[derive(Debug, Clone, Default)]
pub struct RemoteToolOutcome {
    pub structured_content: Option<Value>,
    pub display_text: Option<String>,
}

/// A connection to an external tool-protocol server.
///
/// `list_tools`/`call_tool` are only valid once connected; calling them
/// before `connect()` (or after `disconnect()`) returns
/// `AgentError::NotConnected`. `connect`/`disconnect` are idempotent
/// no-ops when already in the target state. At most one in-flight call per
/// connection unless a concrete implementation documents otherwise.
#[async_trait]
pub trait RemoteToolConnection: Send + Sync {
    async fn connect(&self) -> Result<(), AgentError>;
    async fn disconnect(&self) -> Result<(), AgentError>;
    fn is_connected(&self) -> bool;
    async fn list_tools(&self) -> Result<Vec<RemoteToolListing>, AgentError>;
    async fn call_tool(&self, name: &str, args: Value) -> Result<RemoteToolOutcome, AgentError>;
}

/// Acquire a connection in a scope that guarantees `disconnect()` on every
/// exit path, including an early return via `?` inside `body`.
///
/// ```rust,no_run
/// # use agentcore::{with_connection, RemoteToolConnection};
/// # use std::sync::Arc;
/// # async fn demo(connection: Arc<dyn RemoteToolConnection>) -> Result<(), agentcore::AgentError> {
/// with_connection(connection, |conn| async move {
///     conn.list_tools().await?;
///     Ok(())
/// })
/// .await
/// # }
/// ```
pub async fn with_connection<F, Fut, T>(
    connection: Arc<dyn RemoteToolConnection>,
    body: F,
) -> Result<T, AgentError>
where
    F: FnOnce(Arc<dyn RemoteToolConnection>) -> Fut,
    Fut: std::future::Future<Output = Result<T, AgentError>>,
{
    connection.connect().await?;
    let result = body(connection.clone()).await;
    connection.disconnect().await?;
    result
}

/// The one bundled remote transport: an HTTP client against a tool server
/// exposing `GET {endpoint}/tools` and `POST {endpoint}/tools/{name}`,
/// grounded in the teacher's MCP HTTP client adapter — same timeout and
/// cache-TTL defaults, same "refresh only when stale" caching rule.
pub struct HttpToolConnection {
    endpoint: String,
    client: reqwest::Client,
    connected: AtomicBool,
    tools_cache: RwLock<Option<Vec<RemoteToolListing>>>,
    last_cache_refresh: Mutex<Option<Instant>>,
    cache_ttl: Duration,
}

impl HttpToolConnection {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("failed to build http client"),
            connected: AtomicBool::new(false),
            tools_cache: RwLock::new(None),
            last_cache_refresh: Mutex::new(None),
            cache_ttl: Duration::from_secs(300),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    async fn should_refresh_cache(&self) -> bool {
        match *self.last_cache_refresh.lock().await {
            None => true,
            Some(last) => last.elapsed() > self.cache_ttl,
        }
    }
}

#[async_trait]
impl RemoteToolConnection for HttpToolConnection {
    async fn connect(&self) -> Result<(), AgentError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AgentError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn list_tools(&self) -> Result<Vec<RemoteToolListing>, AgentError> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected);
        }
        if !self.should_refresh_cache().await {
            if let Some(cached) = self.tools_cache.read().await.clone() {
                return Ok(cached);
            }
        }

        let response = self
            .client
            .get(format!("{}/tools", self.endpoint))
            .send()
            .await
            .map_err(|e| AgentError::ToolExecutionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::ToolExecutionError(format!(
                "remote tool server returned status {}",
                response.status()
            )));
        }

        let raw: Vec<RemoteToolJson> = response
            .json()
            .await
            .map_err(|e| AgentError::SerializationError(e.to_string()))?;
        let listings: Vec<RemoteToolListing> = raw.into_iter().map(RemoteToolListing::from).collect();

        *self.tools_cache.write().await = Some(listings.clone());
        *self.last_cache_refresh.lock().await = Some(Instant::now());
        Ok(listings)
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<RemoteToolOutcome, AgentError> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected);
        }
        let response = self
            .client
            .post(format!("{}/tools/{}", self.endpoint, name))
            .json(&args)
            .send()
            .await
            .map_err(|e| AgentError::ToolExecutionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::ToolExecutionError(format!(
                "remote tool '{}' returned status {}",
                name,
                response.status()
            )));
        }

        let body: RemoteCallJson = response
            .json()
            .await
            .map_err(|e| AgentError::SerializationError(e.to_string()))?;
        Ok(RemoteToolOutcome {
            structured_content: body.structured_content,
            display_text: body.text,
        })
    }
}

#[derive(serde::Deserialize)]
struct RemoteToolJson {
    name: String,
    description: String,
    #[serde(default)]
    input_schema: Value,
}

/// Map a JSON-schema `type` string to the registry's parameter type, per
/// the same `integer/number/string/boolean/array/object` mapping local
/// tool registration uses. Anything unknown or missing falls back to
/// `Opaque`.
fn json_schema_type(type_str: Option<&str>) -> crate::agentcore::registry::ToolParameterType {
    use crate::agentcore::registry::ToolParameterType;
    match type_str {
        Some("integer") => ToolParameterType::Integer,
        Some("number") => ToolParameterType::Number,
        Some("string") => ToolParameterType::String,
        Some("boolean") => ToolParameterType::Boolean,
        Some("array") => ToolParameterType::Array,
        Some("object") => ToolParameterType::Object,
        _ => ToolParameterType::Opaque,
    }
}

impl From<RemoteToolJson> for RemoteToolListing {
    fn from(raw: RemoteToolJson) -> Self {
        let required: std::collections::HashSet<&str> = raw
            .input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let parameters = raw
            .input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .map(|(name, prop_schema)| {
                        let param_type = json_schema_type(
                            prop_schema.get("type").and_then(Value::as_str),
                        );
                        let param = ToolParameter::new(name.clone(), param_type);
                        if required.contains(name.as_str()) {
                            param.required()
                        } else {
                            param
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        RemoteToolListing {
            name: raw.name,
            description: raw.description,
            parameters,
        }
    }
}

#[derive(serde::Deserialize)]
struct RemoteCallJson {
    #[serde(default)]
    structured_content: Option<Value>,
    #[serde(default)]
    text: Option<String>,
}
