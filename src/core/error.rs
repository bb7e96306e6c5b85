//! 引擎错误类型
//!
//! 规划失败（解析 / 后端）、执行失败（首个失败步骤）、取消、持久化错误。
//! 工具层的失败（工具缺失、工具不存在、工具内部错误）不会出现在这里：
//! 它们在 ToolRegistry 边界被统一转成 success=false 的 ToolResult。

use thiserror::Error;

use crate::llm::LlmError;

/// 计划生命周期中可能出现的错误
#[derive(Error, Debug)]
pub enum PlanError {
    /// 后端输出无法解析为步骤序列，不产出部分计划
    #[error("Plan parse error: {0}")]
    Parse(String),

    /// 后端调用失败（额度耗尽由 Planner 内部兜底，不会走到这里）
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    /// 计划结构非法（重复 id、next 指向不存在的步骤、跳转成环等）
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// 首个 success=false 的步骤，后续步骤全部放弃
    #[error("Step {step_id} failed: {message}")]
    ExecutionFailed { step_id: String, message: String },

    #[error("Plan execution cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl PlanError {
    /// 失败步骤 id（仅 ExecutionFailed 有）
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            PlanError::ExecutionFailed { step_id, .. } => Some(step_id),
            _ => None,
        }
    }
}

/// 持久化层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}
