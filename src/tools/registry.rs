//! 工具注册表
//!
//! 所有工具实现 Tool trait（definition / execute），由 ToolRegistry 按名注册与查找，
//! 并按分类维护插入顺序的名称列表。execute_tool 是「抛错 → 结构化失败」的唯一归一化边界：
//! 工具不存在、返回 Err、甚至 panic，调用方拿到的都是 success=false 的 ToolResult。
//!
//! 注册 / 注销少见，分发频繁：内部用 RwLock 保护索引，取出 Arc<dyn Tool> 后即释放锁，
//! 不会跨 await 持锁，多个计划可并发分发。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use futures_util::FutureExt;
use indexmap::IndexMap;

use super::types::{ToolCall, ToolDefinition, ToolError, ToolResult, ValidationReport};

/// 工具能力契约：声明定义（供发现），执行单个动作并返回结构化结果
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具定义（名称、描述、分类、参数 schema、是否需要鉴权）
    fn definition(&self) -> ToolDefinition;

    /// 执行工具；call.arguments 已是替换后的字面值
    async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError>;
}

#[derive(Default)]
struct RegistryInner {
    tools: HashMap<String, Arc<dyn Tool>>,
    categories: IndexMap<String, Vec<String>>,
}

/// 工具注册表：name → Tool 与 category → [name] 两个索引
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册工具：同名覆盖；名称先从所有分类中移除，再追加到新分类末尾，保证不重复
    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let definition = tool.definition();
        let name = definition.name.clone();
        let mut inner = self.write();

        if inner.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!(tool = %name, "replacing registered tool");
            for names in inner.categories.values_mut() {
                names.retain(|n| n != &name);
            }
        }
        inner
            .categories
            .entry(definition.category)
            .or_default()
            .push(name);
    }

    /// 注销工具：从主索引与分类列表中删除，其余条目相对顺序不变；返回是否存在
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.write();
        let existed = inner.tools.remove(name).is_some();
        for names in inner.categories.values_mut() {
            names.retain(|n| n != name);
        }
        existed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().tools.contains_key(name)
    }

    /// 按分类插入顺序列出全部工具名
    pub fn tool_names(&self) -> Vec<String> {
        self.read()
            .categories
            .values()
            .flat_map(|names| names.iter().cloned())
            .collect()
    }

    /// 全部工具定义（按分类插入顺序）
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let tools: Vec<Arc<dyn Tool>> = {
            let inner = self.read();
            inner
                .categories
                .values()
                .flatten()
                .filter_map(|name| inner.tools.get(name).cloned())
                .collect()
        };
        tools.iter().map(|t| t.definition()).collect()
    }

    /// 某分类下的工具定义（插入顺序）
    pub fn tools_by_category(&self, category: &str) -> Vec<ToolDefinition> {
        let tools: Vec<Arc<dyn Tool>> = {
            let inner = self.read();
            inner
                .categories
                .get(category)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|name| inner.tools.get(name).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        tools.iter().map(|t| t.definition()).collect()
    }

    pub fn categories(&self) -> Vec<String> {
        self.read().categories.keys().cloned().collect()
    }

    /// 执行工具调用；任何失败都归一化为 success=false 的结果，从不返回错误
    pub async fn execute_tool(&self, call: ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            return ToolResult::failure(format!("Tool not found: {}", call.name));
        };

        let name = call.name.clone();
        match AssertUnwindSafe(tool.execute(call)).catch_unwind().await {
            Ok(Ok(result)) => result.normalized(),
            Ok(Err(e)) => ToolResult::failure(e.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %name, panic = %message, "tool panicked");
                ToolResult::failure(format!("Tool {name} panicked: {message}"))
            }
        }
    }

    /// 仅做形状检查：工具存在且参数是 JSON 对象；按参数 schema 校验尚未实现
    pub fn validate_tool_call(&self, call: &ToolCall) -> ValidationReport {
        if !self.contains(&call.name) {
            return ValidationReport {
                valid: false,
                errors: vec![format!("Tool not found: {}", call.name)],
            };
        }

        let mut errors = Vec::new();
        if !call.arguments.is_object() {
            errors.push("Tool arguments must be an object".to_string());
        }
        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// 生成工具清单 JSON（嵌入规划 prompt）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<serde_json::Value> = self
            .tool_definitions()
            .into_iter()
            .map(|def| {
                serde_json::json!({
                    "name": def.name,
                    "description": def.description,
                    "category": def.category,
                    "parameters": def.parameters,
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
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
    use serde_json::json;

    struct NamedTool {
        name: &'static str,
        category: &'static str,
    }

    #[async_trait]
    impl Tool for NamedTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.name, "test tool").with_category(self.category)
        }

        async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(call.arguments))
        }
    }

    struct ErrTool;

    #[async_trait]
    impl Tool for ErrTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("err", "always errors")
        }

        async fn execute(&self, _call: ToolCall) -> Result<ToolResult, ToolError> {
            Err(ToolError::Failed("selector matched nothing".to_string()))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("panic", "always panics")
        }

        async fn execute(&self, _call: ToolCall) -> Result<ToolResult, ToolError> {
            panic!("kaboom")
        }
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(NamedTool { name: "scrape", category: "browser" });
        registry.register(NamedTool { name: "click", category: "browser" });
        registry.register(NamedTool { name: "type", category: "browser" });
        registry.register(NamedTool { name: "copy", category: "system" });
        registry
    }

    fn names(defs: Vec<ToolDefinition>) -> Vec<String> {
        defs.into_iter().map(|d| d.name).collect()
    }

    #[test]
    fn test_unregister_keeps_relative_order() {
        let registry = registry();
        assert!(registry.unregister("click"));

        assert_eq!(names(registry.tools_by_category("browser")), vec!["scrape", "type"]);
        assert_eq!(names(registry.tool_definitions()), vec!["scrape", "type", "copy"]);
        assert!(registry.get("click").is_none());
        assert!(!registry.unregister("click"));
    }

    #[test]
    fn test_reregister_replaces_without_duplicates() {
        let registry = registry();
        registry.register(NamedTool { name: "click", category: "system" });

        assert_eq!(names(registry.tools_by_category("browser")), vec!["scrape", "type"]);
        assert_eq!(names(registry.tools_by_category("system")), vec!["copy", "click"]);
        assert_eq!(registry.tool_names().len(), 4);
        assert_eq!(registry.categories(), vec!["browser", "system"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_failure() {
        let registry = registry();
        let result = registry.execute_tool(ToolCall::new("nope", json!({}))).await;
        assert!(!result.success);
        assert!(result.error_message().contains("nope"));
    }

    #[tokio::test]
    async fn test_tool_error_and_panic_are_normalized() {
        let registry = ToolRegistry::new();
        registry.register(ErrTool);
        registry.register(PanicTool);

        let result = registry.execute_tool(ToolCall::new("err", json!({}))).await;
        assert!(!result.success);
        assert_eq!(result.error_message(), "selector matched nothing");

        let result = registry.execute_tool(ToolCall::new("panic", json!({}))).await;
        assert!(!result.success);
        assert!(result.error_message().contains("kaboom"));
    }

    #[test]
    fn test_schema_json_lists_tools_in_order() {
        let schema: serde_json::Value = serde_json::from_str(&registry().to_schema_json()).unwrap();
        let listed: Vec<&str> = schema
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(listed, vec!["scrape", "click", "type", "copy"]);
        assert_eq!(schema[3]["category"], "system");
    }

    #[test]
    fn test_validate_tool_call_shape() {
        let registry = registry();
        assert!(registry.validate_tool_call(&ToolCall::new("scrape", json!({"a": 1}))).valid);

        let report = registry.validate_tool_call(&ToolCall::new("scrape", json!("text")));
        assert!(!report.valid);
        assert_eq!(report.errors, vec!["Tool arguments must be an object"]);

        let report = registry.validate_tool_call(&ToolCall::new("ghost", json!({})));
        assert!(report.errors[0].contains("ghost"));
    }
}
