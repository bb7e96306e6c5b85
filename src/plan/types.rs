//! 计划类型定义
//!
//! Plan / Step / PlanStatus 等核心数据类型。Step 是严格的标签联合：
//! `type` 字段决定步骤种类，每种只携带与自己相关的字段。线上格式即后端输出的 JSON 数组元素。

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PlanError;
use crate::tools::ToolResult;

pub type PlanId = String;
pub type StepId = String;

/// 计划状态：pending → executing → (paused → executing)* → complete | failed，不可回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// 已创建，等待执行
    Pending,
    /// 正在执行
    Executing,
    /// 挂起，等待外部输入
    Paused,
    /// 全部步骤完成
    Complete,
    /// 执行失败或被取消
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Complete | PlanStatus::Failed)
    }

    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        self == next
            || matches!(
                (self, next),
                (Pending, Executing)
                    | (Executing, Paused)
                    | (Executing, Complete)
                    | (Executing, Failed)
                    | (Paused, Executing)
                    | (Paused, Failed)
            )
    }
}

/// next 指针：单个 id 或 id 列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum NextStep {
    One(StepId),
    Many(Vec<StepId>),
}

impl NextStep {
    /// 第一个目标 id
    pub fn first(&self) -> Option<&str> {
        match self {
            NextStep::One(id) => Some(id),
            NextStep::Many(ids) => ids.first().map(String::as_str),
        }
    }
}

/// wait 步骤参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WaitInput {
    /// 等待时长（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// ask 步骤参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AskInput {
    /// 向用户展示的问题
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// compute 步骤参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ComputeInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// 步骤种类（按 `type` 字段区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
    /// 调用工具；input 可含 {{stepId.field}} 占位符
    Tool {
        #[serde(default)]
        tool: String,
        #[serde(default)]
        input: Value,
    },
    /// 定时等待
    Wait {
        #[serde(default)]
        input: Option<WaitInput>,
    },
    /// 请求用户输入
    Ask {
        #[serde(default)]
        input: Option<AskInput>,
    },
    /// 计算（当前仅回显表达式）
    Compute {
        #[serde(default)]
        input: Option<ComputeInput>,
    },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Tool { .. } => "tool",
            StepKind::Wait { .. } => "wait",
            StepKind::Ask { .. } => "ask",
            StepKind::Compute { .. } => "compute",
        }
    }
}

/// 计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    pub id: StepId,
    #[serde(flatten)]
    pub kind: StepKind,
    /// 守卫条件（如 "success" / "failure"）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 建议的后继步骤；仅在 follow_next 分支模式下影响执行顺序
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextStep>,
}

impl Step {
    fn with_kind(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            condition: None,
            description: None,
            next: None,
        }
    }

    pub fn tool(id: impl Into<String>, tool: impl Into<String>, input: Value) -> Self {
        Self::with_kind(
            id,
            StepKind::Tool {
                tool: tool.into(),
                input,
            },
        )
    }

    pub fn wait(id: impl Into<String>, duration_ms: Option<u64>) -> Self {
        Self::with_kind(
            id,
            StepKind::Wait {
                input: Some(WaitInput {
                    duration: duration_ms,
                }),
            },
        )
    }

    pub fn ask(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            StepKind::Ask {
                input: Some(AskInput {
                    prompt: Some(prompt.into()),
                }),
            },
        )
    }

    pub fn compute(id: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            StepKind::Compute {
                input: Some(ComputeInput {
                    expression: Some(expression.into()),
                }),
            },
        )
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_next(mut self, next: NextStep) -> Self {
        self.next = Some(next);
        self
    }

    /// 日志用的简短标签
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(self.kind.name())
    }
}

/// ask 挂起时保存的待输入槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInput {
    pub step_id: StepId,
    pub prompt: String,
}

/// 计划：目标、有序步骤、状态与逐步结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: PlanId,
    pub goal: String,
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub status: PlanStatus,
    /// 当前（或最后尝试的）步骤下标，范围 [0, steps.len()]
    #[serde(default)]
    pub current_step_index: usize,
    /// stepId → 结果，按执行顺序；只包含实际尝试过的步骤
    #[serde(default)]
    pub results: IndexMap<StepId, ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_input: Option<PendingInput>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            steps,
            created_at: Utc::now(),
            status: PlanStatus::Pending,
            current_step_index: 0,
            results: IndexMap::new(),
            pending_input: None,
        }
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn result(&self, step_id: &str) -> Option<&ToolResult> {
        self.results.get(step_id)
    }

    /// 状态迁移；非法迁移（如 complete → executing）返回 InvalidPlan
    pub fn transition(&mut self, next: PlanStatus) -> Result<(), PlanError> {
        if !self.status.can_transition_to(next) {
            return Err(PlanError::InvalidPlan(format!(
                "plan {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// 步骤 id 必须唯一
    pub fn validate(&self) -> Result<(), PlanError> {
        ensure_unique_ids(&self.steps)
    }
}

pub(crate) fn ensure_unique_ids(steps: &[Step]) -> Result<(), PlanError> {
    let mut seen = std::collections::HashSet::new();
    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(PlanError::InvalidPlan(format!("duplicate step id: {}", step.id)));
        }
    }
    Ok(())
}
