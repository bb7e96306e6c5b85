//! Echo 工具（测试 / 演示用）

use async_trait::async_trait;
use serde_json::json;

use crate::tools::{Tool, ToolCall, ToolDefinition, ToolError, ToolResult};

/// Echo 工具：回显 text 参数
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("echo", "Echo text back (for testing)")
            .with_category("system")
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo" }
                },
                "required": ["text"]
            }))
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
        let text = call
            .arguments
            .get("text")
            .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".to_string()))?;
        Ok(ToolResult::ok(json!({ "text": text })))
    }
}
