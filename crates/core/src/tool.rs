//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! search the web, drive a browser session, end the task, etc.
//! The registry owns argument validation and failure containment, so a
//! tool call can never abort the agent loop.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::message::MessageToolCall;
use crate::provider::ToolDefinition;
use crate::schema;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Parse the raw call proposed by the model.
    ///
    /// Blank argument strings are treated as an empty object.
    pub fn from_message(call: &MessageToolCall) -> Result<Self, ToolError> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| {
                ToolError::InvalidArguments(format!("arguments for '{}' are not valid JSON: {e}", call.name))
            })?
        };
        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }
}

/// The result of a tool execution.
///
/// Exactly one of `output` / `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The output content on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// The error description on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Whether the agent loop must stop after this call
    #[serde(default)]
    pub is_terminal: bool,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            output: Some(output.into()),
            error: None,
            is_terminal: false,
            data: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            output: None,
            error: Some(error.into()),
            is_terminal: false,
            data: None,
        }
    }

    /// A successful result that ends the agent loop.
    pub fn terminal(output: impl Into<String>) -> Self {
        Self {
            is_terminal: true,
            ..Self::success(output)
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The text recorded in the tool message for this result.
    pub fn content(&self) -> String {
        match (&self.output, &self.error) {
            (_, Some(err)) => format!("Error: {err}"),
            (Some(out), None) => out.clone(),
            (None, None) => String::new(),
        }
    }
}

/// The core Tool trait.
///
/// Each tool (terminate, web_search, browser) implements this trait. Tools are
/// registered in the ToolRegistry and made available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search", "browser").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Whether the tool holds external state that only one call may touch at a time.
    fn is_exclusive(&self) -> bool {
        false
    }

    /// A short description of the tool's live state, used as transient prompt context.
    async fn context(&self) -> Option<String> {
        None
    }

    /// Release external resources (browser sessions, connections).
    async fn shutdown(&self) -> std::result::Result<(), ToolError> {
        Ok(())
    }

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct Registered {
    tool: Box<dyn Tool>,
    gate: Option<Mutex<()>>,
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Dispatch tool calls, receiving a `ToolResult` whatever happens
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        let gate = tool.is_exclusive().then(|| Mutex::new(()));
        if self.tools.insert(name.clone(), Registered { tool, gate }).is_some() {
            warn!(tool = %name, "Replaced previously registered tool");
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|r| r.tool.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|r| r.tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatch a call by name.
    ///
    /// Unknown tools, invalid arguments, execution errors and panics all come
    /// back as a `ToolResult` carrying `error`.
    pub async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> ToolResult {
        let Some(entry) = self.tools.get(name) else {
            let mut known = self.names();
            known.sort_unstable();
            return ToolResult::failure(format!(
                "{}. Available tools: {}",
                ToolError::NotFound(name.to_string()),
                known.join(", ")
            ));
        };

        if let Err(e) = schema::validate(&entry.tool.parameters_schema(), &arguments) {
            debug!(tool = %name, error = %e, "Rejected tool arguments");
            return ToolResult::failure(e.to_string());
        }

        let _guard = match &entry.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let outcome = AssertUnwindSafe(entry.tool.execute(arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                ToolResult::failure(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %name, reason = %reason, "Tool panicked");
                ToolResult::failure(
                    ToolError::Panicked {
                        tool_name: name.to_string(),
                        reason,
                    }
                    .to_string(),
                )
            }
        }
    }

    /// Dispatch a parsed tool call, stamping the result with its call id.
    pub async fn dispatch_call(&self, call: &ToolCall) -> ToolResult {
        self.dispatch(&call.name, call.arguments.clone())
            .await
            .with_call_id(call.id.clone())
    }

    /// Shut down every tool, logging failures.
    pub async fn shutdown_all(&self) {
        for (name, entry) in &self.tools {
            if let Err(e) = entry.tool.shutdown().await {
                warn!(tool = %name, error = %e, "Tool shutdown failed");
            }
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::success(text))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str { "fail" }
        fn description(&self) -> &str { "Always fails" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "fail".into(),
                reason: "boom".into(),
            })
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &str { "panic" }
        fn description(&self) -> &str { "Panics" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            panic!("tool exploded");
        }
    }

    /// Tracks how many executions overlap.
    struct ExclusiveTool {
        active: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for ExclusiveTool {
        fn name(&self) -> &str { "exclusive" }
        fn description(&self) -> &str { "One at a time" }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn is_exclusive(&self) -> bool { true }
        async fn execute(&self, _arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(ToolResult::success("done"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(FailingTool));
        registry.register(Box::new(PanickingTool));
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn registry_definitions_sorted() {
        let defs = registry().definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail", "panic"]);
    }

    #[tokio::test]
    async fn dispatch_executes_tool() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry().dispatch_call(&call).await;
        assert!(result.is_success());
        assert_eq!(result.output.as_deref(), Some("hello world"));
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn dispatch_missing_tool_is_error_result() {
        let result = registry().dispatch("nonexistent", serde_json::json!({})).await;
        let err = result.error.unwrap();
        assert!(err.contains("Tool not found: nonexistent"));
        assert!(err.contains("echo"));
    }

    #[tokio::test]
    async fn dispatch_validates_arguments() {
        let result = registry().dispatch("echo", serde_json::json!({"text": 5})).await;
        assert!(result.error.unwrap().contains("is not of type \"string\""));
    }

    #[tokio::test]
    async fn dispatch_contains_execution_errors() {
        let result = registry().dispatch("fail", serde_json::json!({})).await;
        assert!(result.error.unwrap().contains("boom"));
        assert!(!result.is_terminal);
    }

    #[tokio::test]
    async fn dispatch_contains_panics() {
        let result = registry().dispatch("panic", serde_json::json!({})).await;
        assert!(result.error.unwrap().contains("tool exploded"));
    }

    #[tokio::test]
    async fn dispatch_never_fails_for_any_sequence() {
        let registry = registry();
        let calls = [
            ("echo", serde_json::json!({"text": "a"})),
            ("panic", serde_json::json!({})),
            ("missing", serde_json::json!(null)),
            ("echo", serde_json::json!("not an object")),
            ("fail", serde_json::json!({})),
            ("echo", serde_json::json!({"text": "b"})),
        ];
        let mut outputs = Vec::new();
        for (name, args) in calls {
            outputs.push(registry.dispatch(name, args).await);
        }
        assert_eq!(outputs.len(), 6);
        assert_eq!(outputs[5].output.as_deref(), Some("b"));
        assert_eq!(outputs.iter().filter(|r| r.is_success()).count(), 2);
    }

    #[tokio::test]
    async fn exclusive_tool_serializes_dispatch() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ExclusiveTool {
            active: active.clone(),
            max_seen: max_seen.clone(),
        }));

        let (a, b, c) = tokio::join!(
            registry.dispatch("exclusive", serde_json::json!({})),
            registry.dispatch("exclusive", serde_json::json!({})),
            registry.dispatch("exclusive", serde_json::json!({})),
        );
        assert!(a.is_success() && b.is_success() && c.is_success());
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tool_call_from_blank_arguments() {
        let call = ToolCall::from_message(&MessageToolCall {
            id: "c1".into(),
            name: "terminate".into(),
            arguments: "  ".into(),
        })
        .unwrap();
        assert!(call.arguments.as_object().unwrap().is_empty());
    }

    #[test]
    fn tool_call_from_invalid_json() {
        let err = ToolCall::from_message(&MessageToolCall {
            id: "c1".into(),
            name: "web_search".into(),
            arguments: "{query:".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn result_content_formats_errors() {
        assert_eq!(ToolResult::failure("nope").content(), "Error: nope");
        assert_eq!(ToolResult::success("yes").content(), "yes");
        assert!(ToolResult::terminal("bye").is_terminal);
    }
}
