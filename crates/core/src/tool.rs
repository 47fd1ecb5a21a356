//! Tool trait: the abstraction over model-invokable capabilities.
//!
//! A capability is a named, schema-described operation the model may request
//! mid-conversation (web search, HTTP calls, sandboxed scripts, state updates).
//! The registry validates arguments against each tool's schema before
//! dispatch and always hands back a [`ToolResult`], so a failing capability
//! never aborts the orchestration loop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use crate::state::{InternalState, MergeReport};

/// A request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's function call id, or is synthesized)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default)]
    pub arguments: Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Name of the tool that produced it
    pub name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Structured output, or `{"error": ...}` on failure
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: Value) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success: true,
            payload,
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            payload: json!({ "error": message.into() }),
        }
    }

    /// The payload as display text, for logs and operator messages.
    pub fn summary(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Payload message for a capability name that has no registered tool.
pub const NOT_FOUND_MESSAGE: &str = "capability not found";

/// Per-invocation execution context.
///
/// The state handle is shared by every invocation of one advance; the log
/// buffer is private to each invocation so that lines can be merged back in
/// request order after concurrent execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    state: Arc<Mutex<InternalState>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ToolContext {
    pub fn new(state: InternalState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A context sharing this one's state with a fresh log buffer.
    pub fn for_invocation(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> InternalState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Per-field validated merge into the shared state.
    pub fn merge_state(&self, delta: &Map<String, Value>) -> MergeReport {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .merge(delta)
    }

    /// Append a line to this invocation's log.
    pub fn log(&self, line: impl Into<String>) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.into());
    }

    /// Drain this invocation's log lines.
    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// The core Tool trait.
///
/// Each capability (updateSelfModel, webSearch, httpRequest, codeInterpreter,
/// shopify) implements this trait and is registered in the [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Whether this tool reads or writes the session state. A round that
    /// contains such a tool is executed sequentially in request order.
    fn touches_state(&self) -> bool {
        false
    }

    /// Check arguments before dispatch. Defaults to the parameter schema.
    fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        validate_arguments(&self.parameters_schema(), arguments)
    }

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Check `arguments` against the subset of JSON Schema the tools use:
/// an object with `required` keys, per-property `type`, and string `enum`.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    let empty = Map::new();
    let args = match arguments {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "expected an object, got {}",
                json_type(other)
            )));
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if args.get(key).is_none_or(Value::is_null) {
                return Err(ToolError::InvalidArguments(format!("missing '{key}'")));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in args {
        let Some(property) = properties.get(key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = property.get("type") {
            let allowed: Vec<&str> = match expected {
                Value::String(t) => vec![t.as_str()],
                Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
                return Err(ToolError::InvalidArguments(format!(
                    "'{key}' must be {}, got {}",
                    allowed.join(" or "),
                    json_type(value)
                )));
            }
        }
        if let (Some(choices), Some(s)) = (property.get("enum").and_then(Value::as_array), value.as_str()) {
            if !choices.iter().any(|c| c.as_str() == Some(s)) {
                return Err(ToolError::InvalidArguments(format!(
                    "'{key}' must be one of {}",
                    Value::Array(choices.clone())
                )));
            }
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A registry of available tools.
///
/// The orchestration loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Validate and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: None,
        }
    }

    /// Bound every tool execution by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::from(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Whether the named tool touches session state. Unknown names do not.
    pub fn touches_state(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.touches_state())
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate and execute a tool call, returning the typed error on failure.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        tool.validate(&call.arguments)?;

        let run = tool.execute(call.arguments.clone(), ctx);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: limit.as_secs(),
            })?,
            None => run.await,
        }
    }

    /// Execute a tool call. Failures become error payloads, never faults.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        match self.dispatch(call, ctx).await {
            Ok(payload) => ToolResult::ok(call, payload),
            Err(ToolError::NotFound(name)) => {
                ctx.log(format!("CapabilityNotFound: '{name}'"));
                ToolResult::error(call, NOT_FOUND_MESSAGE)
            }
            Err(e) => {
                ctx.log(format!("{}: {e}", e.kind()));
                ToolResult::error(call, e.to_string())
            }
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "mode": { "type": "string", "enum": ["plain", "loud"] }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
            ctx.log("echoing");
            Ok(arguments["text"].clone())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "Never finishes in time" }
        fn parameters_schema(&self) -> Value { json!({"type": "object"}) }
        async fn execute(&self, _arguments: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall { id: "call_1".into(), name: name.into(), arguments }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert!(!registry.touches_state("echo"));
    }

    #[test]
    fn registry_definitions() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let ctx = ToolContext::new(InternalState::default());

        let result = registry.execute(&call("echo", json!({"text": "hello world"})), &ctx).await;
        assert!(result.success);
        assert_eq!(result.payload, json!("hello world"));
        assert_eq!(ctx.take_log(), vec!["echoing"]);
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let ctx = ToolContext::new(InternalState::default());
        let result = registry.execute(&call("doSomething", json!({})), &ctx).await;
        assert!(!result.success);
        assert_eq!(result.payload, json!({"error": "capability not found"}));
        assert_eq!(result.name, "doSomething");
    }

    #[tokio::test]
    async fn invalid_arguments_rejected_before_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let ctx = ToolContext::new(InternalState::default());

        let err = registry.dispatch(&call("echo", json!({})), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = registry
            .dispatch(&call("echo", json!({"text": 5})), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must be string"));

        let err = registry
            .dispatch(&call("echo", json!({"text": "x", "mode": "quiet"})), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("one of"));

        // The executor never ran.
        assert!(ctx.take_log().iter().all(|l| l != "echoing"));
    }

    #[tokio::test(start_paused = true)]
    async fn execution_is_bounded_by_timeout() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_secs(5));
        registry.register(Box::new(SlowTool));
        let ctx = ToolContext::new(InternalState::default());
        let result = registry.execute(&call("slow", json!({})), &ctx).await;
        assert!(!result.success);
        assert!(result.summary().contains("timed out"));
    }

    #[test]
    fn null_arguments_treated_as_empty_object() {
        assert!(validate_arguments(&json!({"type": "object"}), &Value::Null).is_ok());
        assert!(validate_arguments(&json!({"type": "object"}), &json!([1])).is_err());
    }

    #[test]
    fn shared_state_separate_logs() {
        let ctx = ToolContext::new(InternalState::default());
        let a = ctx.for_invocation();
        let b = ctx.for_invocation();
        a.merge_state(json!({"novelty": 0.1}).as_object().unwrap());
        b.log("b ran");
        assert_eq!(
            b.state().get(crate::state::Dimension::Novelty),
            0.1
        );
        assert!(a.take_log().is_empty());
        assert_eq!(b.take_log(), vec!["b ran"]);
    }
}
