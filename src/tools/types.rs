//! 工具调用的数据类型：定义、调用、结果、错误

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 未声明分类的工具归入此分类
pub const DEFAULT_CATEGORY: &str = "general";

/// 工具静态声明（供发现与 prompt 生成）；注册后不可变，同名重新注册即替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    /// 类 JSON-Schema 的参数描述
    #[serde(rename = "parametersJsonSchema", default = "empty_schema")]
    pub parameters: Value,
    #[serde(default)]
    pub requires_auth: bool,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn empty_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: default_category(),
            parameters: empty_schema(),
            requires_auth: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }

    pub fn with_requires_auth(mut self, requires_auth: bool) -> Self {
        self.requires_auth = requires_auth;
        self
    }
}

/// 一次工具调用：参数已完成占位符替换，工具本身不做模板处理
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// 读取字符串参数
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// 结果元数据：executionTimeMillis 无论成败都会填写
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    pub execution_time_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// 工具执行结果；success=false 时 error 一定有值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

impl ToolResult {
    pub fn ok(data: impl Into<Value>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            error: None,
            metadata: ToolMetadata::default(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: ToolMetadata::default(),
        }
    }

    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.metadata.execution_time_millis = millis;
        self
    }

    pub fn with_tokens_used(mut self, tokens: u64) -> Self {
        self.metadata.tokens_used = Some(tokens);
        self
    }

    /// 失败信息；反序列化得到的失败结果可能缺 error，此时给出占位文本
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }

    /// 修复反序列化来的失败结果缺 error 的情况
    pub(crate) fn normalized(mut self) -> Self {
        if !self.success && self.error.is_none() {
            self.error = Some("unknown error".to_string());
        }
        self
    }
}

/// 工具 execute 返回的错误；由 ToolRegistry 统一转为失败的 ToolResult
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// validate_tool_call 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_always_carries_error() {
        let r = ToolResult::failure("boom").with_execution_time(12);
        assert!(!r.success);
        assert_eq!(r.error_message(), "boom");
        assert_eq!(r.metadata.execution_time_millis, 12);
    }

    #[test]
    fn test_result_wire_format() {
        let r = ToolResult::ok(serde_json::json!({"n": 1})).with_execution_time(3);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["metadata"]["executionTimeMillis"], 3);
        assert!(v.get("error").is_none());

        let back: ToolResult =
            serde_json::from_value(serde_json::json!({"success": false})).unwrap();
        assert_eq!(back.normalized().error_message(), "unknown error");
    }

    #[test]
    fn test_definition_defaults() {
        let def: ToolDefinition = serde_json::from_value(serde_json::json!({
            "name": "t",
            "description": "d"
        }))
        .unwrap();
        assert_eq!(def.category, DEFAULT_CATEGORY);
        assert!(!def.requires_auth);
        assert_eq!(def.parameters["type"], "object");
    }
}
