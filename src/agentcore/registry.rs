//! The tool registry and dispatch layer.
//!
//! Unifies local Rust callables and remote tool-protocol connections behind
//! one [`ToolDescriptor`]/[`ToolRegistry`] abstraction, following the tagged
//! `Local(..) | Remote(..)` shape over an inheritance-style hierarchy.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::agentcore::error::AgentError;
use crate::agentcore::remote::RemoteToolConnection;

/// The JSON-schema-shaped type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Anything the schema mapping doesn't recognize; rendered as an
    /// untyped/opaque schema node, matching the unannotated → string /
    /// unknown → opaque rules.
    Opaque,
}

impl ToolParameterType {
    fn schema_name(self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
            ToolParameterType::Opaque => "opaque",
        }
    }
}

/// A single named parameter in a tool's schema.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<Value>,
    /// Element schema, for `ToolParameterType::Array` parameters.
    pub items: Option<Box<ToolParameter>>,
    /// Nested fields, for `ToolParameterType::Object` parameters.
    pub properties: Option<Vec<ToolParameter>>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
            items: None,
            properties: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parameters with an explicit default are implicitly optional, unless
    /// the caller has already marked them required.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_items(mut self, items: ToolParameter) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    pub fn with_properties(mut self, properties: Vec<ToolParameter>) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Render this parameter as one JSON-schema `properties` entry.
    fn to_schema_node(&self) -> Value {
        let mut node = Map::new();
        node.insert(
            "type".to_string(),
            Value::String(self.param_type.schema_name().to_string()),
        );
        if let Some(description) = &self.description {
            node.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(default) = &self.default {
            node.insert("default".to_string(), default.clone());
        }
        if let Some(items) = &self.items {
            node.insert("items".to_string(), items.to_schema_node());
        }
        if let Some(properties) = &self.properties {
            let mut props = Map::new();
            for p in properties {
                props.insert(p.name.clone(), p.to_schema_node());
            }
            node.insert("properties".to_string(), Value::Object(props));
        }
        Value::Object(node)
    }
}

/// The result of dispatching a tool, normalized uniformly regardless of
/// whether the tool was local or remote.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Compact text/JSON string suitable for inclusion in a prompt.
    pub llm_content: String,
    /// Human-facing rendering of the same result.
    pub display_content: String,
    /// The original, unwrapped value, kept around for callers that want
    /// more than the two string views above.
    pub raw_result: Value,
}

impl ToolResult {
    /// Wrap a bare value returned by a local executor. Every local
    /// dispatch path routes through this — there is exactly one wrapping
    /// rule, not one per executor flavor.
    pub fn wrap(value: Value) -> Self {
        let text = coerce_to_string(&value);
        Self {
            llm_content: text.clone(),
            display_content: text,
            raw_result: value,
        }
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A local tool function, invoked with the synthesized arguments.
pub type LocalExecutor =
    Arc<dyn Fn(Value) -> Result<Value, AgentError> + Send + Sync>;

/// A local tool backed by an async function, for executors that need to do
/// I/O.
pub type AsyncLocalExecutor = Arc<
    dyn Fn(Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, AgentError>> + Send>>
        + Send
        + Sync,
>;

/// Where a registered tool's execution is dispatched to.
///
/// A tagged variant, not an inheritance hierarchy: local callables and
/// remote connections are different enough in how they're invoked that
/// forcing them through one trait object would hide more than it unifies.
#[derive(Clone)]
pub enum ToolOrigin {
    Local(LocalExecutor),
    LocalAsync(AsyncLocalExecutor),
    Remote(Arc<dyn RemoteToolConnection>),
}

impl fmt::Debug for ToolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOrigin::Local(_) => write!(f, "ToolOrigin::Local(..)"),
            ToolOrigin::LocalAsync(_) => write!(f, "ToolOrigin::LocalAsync(..)"),
            ToolOrigin::Remote(_) => write!(f, "ToolOrigin::Remote(..)"),
        }
    }
}

/// A registered tool: its schema plus where to dispatch it.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
    pub origin: ToolOrigin,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, origin: ToolOrigin) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            origin,
        }
    }

    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// The ephemeral JSON schema handed to the gateway for structured-output
    /// parameter synthesis, mirroring `parameters_schema.properties` plus a
    /// `required` list.
    pub fn derived_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(param.name.clone(), param.to_schema_node());
            if param.required && param.default.is_none() {
                required.push(Value::String(param.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": Value::Array(required),
        })
    }
}

/// Any tool instance that knows how to execute itself, for registering
/// pre-built tool objects rather than a bare callable.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Vec<ToolParameter>;
    async fn execute(&self, args: Value) -> Result<Value, AgentError>;
}

/// The merged local+remote tool catalog.
///
/// Registration is last-write-wins: registering a name that already
/// exists overwrites the earlier entry and logs a warning, whether the
/// collision is local-over-local, remote-over-local, or any other
/// combination.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    schema_cache: RwLock<HashMap<String, Value>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            schema_cache: RwLock::new(HashMap::new()),
        }
    }

    async fn insert(&self, descriptor: ToolDescriptor) {
        let name = descriptor.name.clone();
        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            log::warn!("tool '{}' re-registered; new registration wins", name);
        }
        tools.insert(name.clone(), descriptor);
        self.schema_cache.write().await.remove(&name);
    }

    /// Register a synchronous local tool.
    pub async fn register_local(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
        executor: LocalExecutor,
    ) {
        let mut descriptor = ToolDescriptor::new(name, description, ToolOrigin::Local(executor));
        descriptor.parameters = parameters;
        self.insert(descriptor).await;
    }

    /// Register an async local tool.
    pub async fn register_local_async(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
        executor: AsyncLocalExecutor,
    ) {
        let mut descriptor =
            ToolDescriptor::new(name, description, ToolOrigin::LocalAsync(executor));
        descriptor.parameters = parameters;
        self.insert(descriptor).await;
    }

    /// Register a pre-built [`LocalTool`] object.
    pub async fn register_tool(&self, tool: Arc<dyn LocalTool>) {
        let parameters = tool.parameters();
        let name = tool.name().to_string();
        let description = tool.description().to_string();
        let tool_for_exec = tool.clone();
        let executor: AsyncLocalExecutor = Arc::new(move |args| {
            let tool = tool_for_exec.clone();
            Box::pin(async move { tool.execute(args).await })
        });
        self.register_local_async(name, description, parameters, executor)
            .await;
    }

    /// Load every tool a remote connection advertises, registering each
    /// under the remote origin. Overwrites any existing entry with the
    /// same name, per the last-write-wins rule.
    pub async fn load_remote(
        &self,
        connection: Arc<dyn RemoteToolConnection>,
    ) -> Result<(), AgentError> {
        for listed in connection.list_tools().await? {
            let mut descriptor =
                ToolDescriptor::new(listed.name, listed.description, ToolOrigin::Remote(connection.clone()));
            descriptor.parameters = listed.parameters;
            self.insert(descriptor).await;
        }
        Ok(())
    }

    pub async fn unregister(&self, name: &str) {
        self.tools.write().await.remove(name);
        self.schema_cache.write().await.remove(name);
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    pub async fn tool_names(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    pub async fn catalog_text(&self) -> String {
        let tools = self.tools.read().await;
        let mut lines: Vec<String> = tools
            .values()
            .map(|t| format!("<tool> {} : {} </tool>", t.name, t.description))
            .collect();
        lines.sort();
        lines.join("\n")
    }

    /// The ephemeral parameter-synthesis schema for one tool, cached by
    /// name and invalidated whenever that name is re-registered.
    pub async fn derived_schema(&self, name: &str) -> Option<Value> {
        if let Some(cached) = self.schema_cache.read().await.get(name) {
            return Some(cached.clone());
        }
        let schema = self.tools.read().await.get(name)?.derived_schema();
        self.schema_cache
            .write()
            .await
            .insert(name.to_string(), schema.clone());
        Some(schema)
    }

    /// Dispatch a tool call and return its normalized result, or
    /// `AgentError::UnknownTool` if no such tool is registered, or
    /// `AgentError::ParameterValidation` if `args` doesn't satisfy the
    /// descriptor's schema.
    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolResult, AgentError> {
        let descriptor = {
            let tools = self.tools.read().await;
            tools
                .get(name)
                .cloned()
                .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?
        };

        validate_arguments(&descriptor, &args)?;

        match &descriptor.origin {
            ToolOrigin::Local(executor) => {
                let raw = executor(args)?;
                Ok(ToolResult::wrap(normalize_result(raw)))
            }
            ToolOrigin::LocalAsync(executor) => {
                let raw = executor(args).await?;
                Ok(ToolResult::wrap(normalize_result(raw)))
            }
            ToolOrigin::Remote(connection) => {
                let outcome = connection.call_tool(name, args).await?;
                let llm_content = match &outcome.structured_content {
                    Some(value) => serde_json::to_string(value)?,
                    None => coerce_to_string(&normalize_result(
                        serde_json::Value::String(outcome.display_text.clone().unwrap_or_default()),
                    )),
                };
                let display_content = outcome
                    .display_text
                    .clone()
                    .unwrap_or_else(|| llm_content.clone());
                Ok(ToolResult {
                    llm_content,
                    display_content,
                    raw_result: outcome
                        .structured_content
                        .clone()
                        .unwrap_or_else(|| json!(outcome.display_text)),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Check `args` against a tool descriptor's parameter schema before
/// dispatch: every required parameter (one with no default) must be
/// present, and a present parameter's JSON type must match what the
/// descriptor declares. `ToolParameterType::Opaque` matches anything,
/// since it stands for a schema the registry couldn't type at
/// registration time.
fn validate_arguments(descriptor: &ToolDescriptor, args: &Value) -> Result<(), AgentError> {
    let obj = args.as_object();
    for param in &descriptor.parameters {
        let value = obj.and_then(|o| o.get(&param.name));
        match value {
            None => {
                if param.required && param.default.is_none() {
                    return Err(AgentError::ParameterValidation {
                        tool: descriptor.name.clone(),
                        reason: format!("missing required parameter '{}'", param.name),
                    });
                }
            }
            Some(value) => {
                if !param_type_matches(param.param_type, value) {
                    return Err(AgentError::ParameterValidation {
                        tool: descriptor.name.clone(),
                        reason: format!(
                            "parameter '{}' expected type {}, got {}",
                            param.name,
                            param.param_type.schema_name(),
                            value_type_name(value)
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

fn param_type_matches(param_type: ToolParameterType, value: &Value) -> bool {
    match param_type {
        ToolParameterType::String => value.is_string(),
        ToolParameterType::Number => value.is_number(),
        ToolParameterType::Integer => value.is_i64() || value.is_u64(),
        ToolParameterType::Boolean => value.is_boolean(),
        ToolParameterType::Array => value.is_array(),
        ToolParameterType::Object => value.is_object(),
        ToolParameterType::Opaque => true,
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a raw tool-execution result before it is wrapped into a
/// [`ToolResult`] and (eventually) appended as a `tool_response` event's
/// data. Mirrors the original implementation's MCP-result serialization:
/// binary `{mime_type, data}` shapes get base64-encoded, lists are mapped
/// element-wise, a bare `text` field is JSON-parsed opportunistically, and
/// everything else passes through or falls back to string coercion.
pub fn normalize_result(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_result).collect()),
        Value::Object(ref obj) => {
            if let (Some(Value::String(mime_type)), Some(data)) =
                (obj.get("mime_type"), obj.get("data"))
            {
                if let Some(bytes) = data.as_str() {
                    return json!({
                        "mime_type": mime_type,
                        "data": bytes,
                    });
                }
                if let Some(array) = data.as_array() {
                    let bytes: Vec<u8> = array
                        .iter()
                        .filter_map(|v| v.as_u64().map(|n| n as u8))
                        .collect();
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    return json!({ "mime_type": mime_type, "data": encoded });
                }
            }
            if let Some(Value::String(text)) = obj.get("text") {
                return match serde_json::from_str::<Value>(text) {
                    Ok(parsed) => parsed,
                    Err(_) => Value::String(text.clone()),
                };
            }
            if let Some(data) = obj.get("data") {
                if let Some(array) = data.as_array() {
                    let bytes: Vec<u8> = array
                        .iter()
                        .filter_map(|v| v.as_u64().map(|n| n as u8))
                        .collect();
                    return Value::String(base64::engine::general_purpose::STANDARD.encode(bytes));
                }
            }
            value
        }
        other @ (Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_execute_local_tool() {
        let registry = ToolRegistry::new();
        registry
            .register_local(
                "add",
                "Adds two numbers",
                vec![
                    ToolParameter::new("a", ToolParameterType::Number).required(),
                    ToolParameter::new("b", ToolParameterType::Number).required(),
                ],
                Arc::new(|args| {
                    let a = args["a"].as_f64().unwrap_or(0.0);
                    let b = args["b"].as_f64().unwrap_or(0.0);
                    Ok(json!({"result": a + b}))
                }),
            )
            .await;

        let result = registry
            .execute("add", json!({"a": 2, "b": 3}))
            .await
            .unwrap();
        assert_eq!(result.raw_result, json!({"result": 5.0}));
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "nope"));
    }

    #[tokio::test]
    async fn re_registering_a_name_overwrites_it() {
        let registry = ToolRegistry::new();
        registry
            .register_local("echo", "first", vec![], Arc::new(|_| Ok(json!("first"))))
            .await;
        registry
            .register_local("echo", "second", vec![], Arc::new(|_| Ok(json!("second"))))
            .await;

        let result = registry.execute("echo", json!({})).await.unwrap();
        assert_eq!(result.raw_result, json!("second"));
    }

    #[test]
    fn bare_callable_return_is_wrapped_uniformly() {
        let wrapped = ToolResult::wrap(json!({"x": 1}));
        assert_eq!(wrapped.llm_content, wrapped.display_content);
        assert_eq!(wrapped.raw_result, json!({"x": 1}));
    }

    #[test]
    fn derived_schema_marks_required_params_without_defaults() {
        let descriptor = ToolDescriptor::new(
            "search",
            "Search something",
            ToolOrigin::Local(Arc::new(|_| Ok(json!(null)))),
        )
        .with_parameter(ToolParameter::new("query", ToolParameterType::String).required())
        .with_parameter(
            ToolParameter::new("limit", ToolParameterType::Integer).with_default(json!(10)),
        );

        let schema = descriptor.derived_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("query")]);
    }

    #[tokio::test]
    async fn execute_rejects_missing_required_parameter() {
        let registry = ToolRegistry::new();
        registry
            .register_local(
                "add",
                "Adds two numbers",
                vec![
                    ToolParameter::new("a", ToolParameterType::Number).required(),
                    ToolParameter::new("b", ToolParameterType::Number).required(),
                ],
                Arc::new(|_| Ok(json!(0))),
            )
            .await;

        let err = registry.execute("add", json!({"a": 2})).await.unwrap_err();
        assert!(matches!(err, AgentError::ParameterValidation { tool, .. } if tool == "add"));
    }

    #[tokio::test]
    async fn execute_rejects_wrong_typed_parameter() {
        let registry = ToolRegistry::new();
        registry
            .register_local(
                "add",
                "Adds two numbers",
                vec![ToolParameter::new("a", ToolParameterType::Number).required()],
                Arc::new(|_| Ok(json!(0))),
            )
            .await;

        let err = registry
            .execute("add", json!({"a": "not a number"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ParameterValidation { .. }));
    }

    struct FakeRemoteConnection;

    #[async_trait]
    impl RemoteToolConnection for FakeRemoteConnection {
        async fn connect(&self) -> Result<(), AgentError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), AgentError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn list_tools(
            &self,
        ) -> Result<Vec<crate::agentcore::remote::RemoteToolListing>, AgentError> {
            Ok(vec![crate::agentcore::remote::RemoteToolListing {
                name: "remote_add".to_string(),
                description: "Adds two numbers remotely".to_string(),
                parameters: vec![ToolParameter::new("count", ToolParameterType::Integer).required()],
            }])
        }
        async fn call_tool(
            &self,
            _name: &str,
            _args: Value,
        ) -> Result<crate::agentcore::remote::RemoteToolOutcome, AgentError> {
            Ok(crate::agentcore::remote::RemoteToolOutcome {
                structured_content: Some(json!(0)),
                display_text: None,
            })
        }
    }

    #[tokio::test]
    async fn execute_rejects_wrong_typed_parameter_for_a_remote_origin_tool() {
        let registry = ToolRegistry::new();
        registry
            .load_remote(Arc::new(FakeRemoteConnection))
            .await
            .unwrap();

        // Before the JSON-schema type mapping, a remote tool's parameters
        // were always synthesized as `Opaque`, so this string value would
        // have passed validation despite the remote schema declaring
        // `count` as an integer.
        let err = registry
            .execute("remote_add", json!({"count": "not a number"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ParameterValidation { .. }));

        registry.execute("remote_add", json!({"count": 3})).await.unwrap();
    }

    #[tokio::test]
    async fn execute_allows_missing_parameter_with_default() {
        let registry = ToolRegistry::new();
        registry
            .register_local(
                "search",
                "Search",
                vec![ToolParameter::new("limit", ToolParameterType::Integer).with_default(json!(10))],
                Arc::new(|_| Ok(json!("ok"))),
            )
            .await;

        registry.execute("search", json!({})).await.unwrap();
    }

    #[test]
    fn normalize_result_base64_encodes_binary_data_field() {
        let value = json!({"mime_type": "image/png", "data": [1, 2, 3]});
        let normalized = normalize_result(value);
        assert_eq!(normalized["mime_type"], json!("image/png"));
        assert!(normalized["data"].as_str().is_some());
    }

    #[test]
    fn normalize_result_parses_json_embedded_in_text_field() {
        let value = json!({"text": "{\"ok\": true}"});
        let normalized = normalize_result(value);
        assert_eq!(normalized, json!({"ok": true}));
    }

    #[test]
    fn normalize_result_passes_through_plain_text() {
        let value = json!({"text": "not json"});
        let normalized = normalize_result(value);
        assert_eq!(normalized, json!("not json"));
    }
}
