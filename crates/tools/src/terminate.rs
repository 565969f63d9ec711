//! Terminate tool: ends the agent loop.
//!
//! Takes no mandatory arguments. The optional `output` is picked up as
//! the task's final answer when present.

use async_trait::async_trait;
use taskwright_core::error::ToolError;
use taskwright_core::tool::{Tool, ToolResult};

pub const TERMINATE_TOOL: &str = "terminate";

pub struct TerminateTool;

#[async_trait]
impl Tool for TerminateTool {
    fn name(&self) -> &str {
        TERMINATE_TOOL
    }

    fn description(&self) -> &str {
        "Finish the current task. Call this when the request is fully handled or cannot be \
         completed. Put the final answer for the user in `output`."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "output": {
                    "type": "string",
                    "description": "The final answer for the user"
                },
                "status": {
                    "type": "string",
                    "description": "How the task ended",
                    "enum": ["success", "failure"]
                }
            },
            "required": []
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let status = arguments["status"].as_str().unwrap_or("success");
        let output = arguments["output"].as_str().map(str::trim).filter(|s| !s.is_empty());

        Ok(
            ToolResult::terminal(format!("The interaction has been completed with status: {status}"))
                .with_data(serde_json::json!({
                    "status": status,
                    "output": output,
                })),
        )
    }
}
