//! 工具执行器
//!
//! 持有共享的 ToolRegistry 与单次调用超时：execute(call) 先做形状校验，再在超时内调用
//! registry.execute_tool，计时写入 metadata（失败时同样填写）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::tools::{ToolCall, ToolRegistry, ToolResult};

/// 工具执行器：施加超时、统一计时与审计
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行调用，永远返回结构化结果；metadata.execution_time_millis 为墙钟耗时
    pub async fn execute(&self, call: ToolCall) -> ToolResult {
        let start = Instant::now();
        let tool_name = call.name.clone();
        let args_preview = args_preview(&call.arguments);

        let report = self.registry.validate_tool_call(&call);
        let (result, outcome) = if !report.valid {
            (ToolResult::failure(report.errors.join("; ")), "invalid")
        } else {
            match timeout(self.timeout, self.registry.execute_tool(call)).await {
                Ok(result) => {
                    let outcome = if result.success { "ok" } else { "error" };
                    (result, outcome)
                }
                Err(_) => (
                    ToolResult::failure(format!(
                        "Tool timeout: {tool_name} exceeded {}s",
                        self.timeout.as_secs()
                    )),
                    "timeout",
                ),
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result.with_execution_time(duration_ms)
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
