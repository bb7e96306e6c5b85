//! 计划执行器
//!
//! 按步骤顺序（或 follow_next 模式下沿 next 指针）逐步执行计划：
//! 执行 → 记录结果 → 失败即终止 → 守卫求值 → wait / ask 的副作用。
//! 单个计划的执行是一条串行的异步流程，计划内状态只由这条流程修改。
//!
//! ask 步骤有两种处理方式：placeholder（立即以 InputProvider 的回答或提示文本本身作为结果）
//! 与 suspend（计划进入 paused，写入 pending_input，宿主稍后调用 resume_plan 继续）。
//! 取消令牌在步骤之间检查，并与 wait / 工具调用 / 输入等待竞争。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::PlanError;
use crate::plan::{
    substitute_parameters, ConditionSet, PendingInput, Plan, PlanStatus, Step, StepKind,
};
use crate::tools::{ToolCall, ToolExecutor, ToolResult};

/// 步骤推进方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchMode {
    /// 严格按下标顺序，next 仅作元数据
    #[default]
    Sequential,
    /// 跳到 next 的第一个目标；没有 next 时顺序推进
    FollowNext,
}

/// ask 步骤处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskMode {
    #[default]
    Placeholder,
    Suspend,
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// wait 步骤未给 duration 时的等待时长（毫秒）
    pub default_wait_ms: u64,
    pub branching: BranchMode,
    pub ask_mode: AskMode,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            default_wait_ms: 1000,
            branching: BranchMode::Sequential,
            ask_mode: AskMode::Placeholder,
        }
    }
}

/// placeholder 模式下提供 ask 回答的宿主接口；返回 None 时以提示文本作为结果
#[async_trait]
pub trait InputProvider: Send + Sync {
    async fn answer(&self, step_id: &str, prompt: &str) -> Option<String>;
}

/// 一次执行的结局；失败走 Err
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Paused { step_id: String, prompt: String },
}

/// 计划执行器
pub struct Executor {
    tools: ToolExecutor,
    options: ExecutorOptions,
    conditions: ConditionSet,
    input: Option<Arc<dyn InputProvider>>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(tools: ToolExecutor, options: ExecutorOptions) -> Self {
        Self {
            tools,
            options,
            conditions: ConditionSet::default(),
            input: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_input_provider(mut self, provider: Arc<dyn InputProvider>) -> Self {
        self.input = Some(provider);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tools(&self) -> &ToolExecutor {
        &self.tools
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// 计划能否开始执行：paused 须走 resume_plan，终态不可重跑。拒绝时计划不被修改
    pub fn ensure_runnable(&self, plan: &Plan) -> Result<(), PlanError> {
        if plan.status == PlanStatus::Paused {
            return Err(PlanError::InvalidPlan(format!(
                "plan {} is paused awaiting input; resume it instead",
                plan.id
            )));
        }
        if !plan.status.can_transition_to(PlanStatus::Executing) {
            return Err(PlanError::InvalidPlan(format!(
                "plan {} cannot move from {:?} to {:?}",
                plan.id,
                plan.status,
                PlanStatus::Executing
            )));
        }
        Ok(())
    }

    /// 从头执行计划（原地修改）。paused 的计划须用 resume_plan 继续。
    pub async fn execute_plan(&self, plan: &mut Plan) -> Result<ExecutionOutcome, PlanError> {
        self.ensure_runnable(plan)?;
        plan.transition(PlanStatus::Executing)?;
        plan.results.clear();
        plan.pending_input = None;
        plan.current_step_index = 0;
        if let Err(e) = plan.validate() {
            return Err(fail(plan, e));
        }

        tracing::info!(plan_id = %plan.id, steps = plan.steps.len(), goal = %plan.goal, "Executing plan");
        self.run_from(plan, 0).await
    }

    /// 以外部回答恢复挂起的计划：回答记为 ask 步骤的结果，然后从下一步继续
    pub async fn resume_plan(
        &self,
        plan: &mut Plan,
        answer: impl Into<String>,
    ) -> Result<ExecutionOutcome, PlanError> {
        let pending = match (plan.status, plan.pending_input.take()) {
            (PlanStatus::Paused, Some(pending)) => pending,
            (status, pending) => {
                plan.pending_input = pending;
                return Err(PlanError::InvalidPlan(format!(
                    "plan {} is not awaiting input (status {:?})",
                    plan.id, status
                )));
            }
        };
        let index = plan.step_index(&pending.step_id).ok_or_else(|| {
            PlanError::InvalidPlan(format!("paused step {} not in plan", pending.step_id))
        })?;

        plan.transition(PlanStatus::Executing)?;
        plan.results
            .insert(pending.step_id.clone(), ToolResult::ok(answer.into()));
        tracing::info!(plan_id = %plan.id, step_id = %pending.step_id, "Resuming plan");

        let next = match self.next_index(plan, index) {
            Ok(next) => next,
            Err(e) => return Err(fail(plan, e)),
        };
        self.run_from(plan, next).await
    }

    async fn run_from(&self, plan: &mut Plan, start: usize) -> Result<ExecutionOutcome, PlanError> {
        let mut index = start;

        while index < plan.steps.len() {
            if self.cancel.is_cancelled() {
                return Err(fail(plan, PlanError::Cancelled));
            }

            let step = plan.steps[index].clone();
            if plan.results.contains_key(&step.id) {
                let err = PlanError::InvalidPlan(format!("step {} would run twice", step.id));
                return Err(fail(plan, err));
            }
            plan.current_step_index = index;
            tracing::info!(
                plan_id = %plan.id,
                step_id = %step.id,
                kind = step.kind.name(),
                "Executing step: {}",
                step.label()
            );

            let result = match self.run_step(&step, &plan.results).await {
                Ok(result) => result,
                Err(e) => return Err(fail(plan, e)),
            };
            plan.results.insert(step.id.clone(), result.clone());

            if !result.success {
                let err = PlanError::ExecutionFailed {
                    step_id: step.id.clone(),
                    message: result.error_message().to_string(),
                };
                return Err(fail(plan, err));
            }

            let guard_passed = step
                .condition
                .as_deref()
                .map_or(true, |c| self.conditions.evaluate(c, &result));

            if guard_passed {
                match &step.kind {
                    StepKind::Wait { input } => {
                        let ms = input
                            .as_ref()
                            .and_then(|i| i.duration)
                            .unwrap_or(self.options.default_wait_ms);
                        if let Err(e) = self.sleep(Duration::from_millis(ms)).await {
                            return Err(fail(plan, e));
                        }
                    }
                    StepKind::Ask { input } => {
                        let prompt = input
                            .as_ref()
                            .and_then(|i| i.prompt.clone())
                            .unwrap_or_default();
                        match self.options.ask_mode {
                            AskMode::Suspend => {
                                plan.pending_input = Some(PendingInput {
                                    step_id: step.id.clone(),
                                    prompt: prompt.clone(),
                                });
                                plan.transition(PlanStatus::Paused)?;
                                tracing::info!(plan_id = %plan.id, step_id = %step.id, "Plan paused for input");
                                return Ok(ExecutionOutcome::Paused {
                                    step_id: step.id,
                                    prompt,
                                });
                            }
                            AskMode::Placeholder => {
                                let answer = match self.ask(&step.id, &prompt).await {
                                    Ok(answer) => answer.unwrap_or(prompt),
                                    Err(e) => return Err(fail(plan, e)),
                                };
                                plan.results.insert(step.id.clone(), ToolResult::ok(answer));
                            }
                        }
                    }
                    StepKind::Tool { .. } | StepKind::Compute { .. } => {}
                }
            } else {
                tracing::debug!(
                    step_id = %step.id,
                    condition = step.condition.as_deref().unwrap_or_default(),
                    "guard not satisfied, skipping step side effects"
                );
            }

            index = match self.next_index(plan, index) {
                Ok(next) => next,
                Err(e) => return Err(fail(plan, e)),
            };
        }

        plan.transition(PlanStatus::Complete)?;
        tracing::info!(plan_id = %plan.id, results = plan.results.len(), "Plan complete");
        Ok(ExecutionOutcome::Completed)
    }

    /// 执行单个步骤；只有取消会返回 Err，其余失败都是 success=false 的结果
    async fn run_step(
        &self,
        step: &Step,
        results: &IndexMap<String, ToolResult>,
    ) -> Result<ToolResult, PlanError> {
        match &step.kind {
            StepKind::Tool { tool, input } => {
                if tool.trim().is_empty() {
                    return Ok(ToolResult::failure("Tool step missing tool name"));
                }
                let input = if input.is_null() {
                    Value::Object(Default::default())
                } else {
                    input.clone()
                };
                let call = ToolCall::new(tool.clone(), substitute_parameters(&input, results));
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(PlanError::Cancelled),
                    result = self.tools.execute(call) => Ok(result),
                }
            }
            StepKind::Compute { input } => Ok(match input.as_ref().and_then(|i| i.expression.clone()) {
                Some(expression) => ToolResult::ok(expression),
                None => ToolResult::failure("Compute step missing expression"),
            }),
            StepKind::Wait { .. } => Ok(ToolResult::ok("wait completed")),
            StepKind::Ask { .. } => Ok(ToolResult::ok("user input requested")),
        }
    }

    async fn sleep(&self, duration: Duration) -> Result<(), PlanError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PlanError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn ask(&self, step_id: &str, prompt: &str) -> Result<Option<String>, PlanError> {
        let Some(provider) = &self.input else {
            return Ok(None);
        };
        tokio::select! {
            _ = self.cancel.cancelled() => Err(PlanError::Cancelled),
            answer = provider.answer(step_id, prompt) => Ok(answer),
        }
    }

    fn next_index(&self, plan: &Plan, index: usize) -> Result<usize, PlanError> {
        if self.options.branching == BranchMode::Sequential {
            return Ok(index + 1);
        }
        match plan.steps[index].next.as_ref().and_then(|n| n.first()) {
            Some(target) => plan.step_index(target).ok_or_else(|| {
                PlanError::InvalidPlan(format!(
                    "step {} points to unknown step {}",
                    plan.steps[index].id, target
                ))
            }),
            None => Ok(index + 1),
        }
    }
}

fn fail(plan: &mut Plan, err: PlanError) -> PlanError {
    plan.status = PlanStatus::Failed;
    tracing::warn!(plan_id = %plan.id, error = %err, "Plan failed");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::NextStep;
    use crate::tools::{EchoTool, Tool, ToolDefinition, ToolError, ToolRegistry};
    use serde_json::json;
    use std::sync::Mutex;

    /// 返回固定数据的工具
    struct FixedTool(&'static str, Value);

    #[async_trait]
    impl Tool for FixedTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new(self.0, "returns fixed data")
        }

        async fn execute(&self, _call: ToolCall) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok(self.1.clone()))
        }
    }

    /// 记录收到的参数
    #[derive(Default)]
    struct RecordingTool(Mutex<Vec<Value>>);

    #[async_trait]
    impl Tool for RecordingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("record", "records arguments")
        }

        async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
            self.0.lock().unwrap().push(call.arguments);
            Ok(ToolResult::ok("recorded"))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition::new("fail", "always fails")
        }

        async fn execute(&self, _call: ToolCall) -> Result<ToolResult, ToolError> {
            Err(ToolError::Failed("element not found".to_string()))
        }
    }

    fn executor_with(options: ExecutorOptions) -> (Executor, Arc<RecordingTool>) {
        let registry = Arc::new(ToolRegistry::new());
        let recorder = Arc::new(RecordingTool::default());
        registry.register(EchoTool);
        registry.register(FailingTool);
        registry.register_arc(recorder.clone());
        registry.register(FixedTool(
            "browser_scrape",
            json!({"title": "Welcome", "items": ["a", "b"]}),
        ));
        (Executor::new(ToolExecutor::new(registry, 5), options), recorder)
    }

    fn executor() -> (Executor, Arc<RecordingTool>) {
        executor_with(ExecutorOptions::default())
    }

    #[tokio::test]
    async fn test_substitution_across_steps() {
        let (exec, recorder) = executor();
        let mut plan = Plan::new(
            "g",
            vec![
                Step::tool("s1", "browser_scrape", json!({"selector": "h1"})),
                Step::tool(
                    "s2",
                    "record",
                    json!({"title": "{{s1.title}}", "all": "{{s1}}", "msg": "Got {{s1.title}}"}),
                ),
            ],
        );

        let outcome = exec.execute_plan(&mut plan).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(plan.status, PlanStatus::Complete);
        assert_eq!(plan.results.len(), 2);

        let args = recorder.0.lock().unwrap()[0].clone();
        assert_eq!(args["title"], "Welcome");
        assert_eq!(args["all"]["items"][1], "b");
        assert_eq!(args["msg"], "Got Welcome");
    }

    #[tokio::test]
    async fn test_failure_stops_with_contiguous_prefix() {
        let (exec, recorder) = executor();
        let mut plan = Plan::new(
            "g",
            vec![
                Step::compute("s1", "1 + 1"),
                Step::tool("s2", "fail", json!({})),
                Step::tool("s3", "record", json!({})),
            ],
        );

        let err = exec.execute_plan(&mut plan).await.unwrap_err();
        match err {
            PlanError::ExecutionFailed { step_id, message } => {
                assert_eq!(step_id, "s2");
                assert!(message.contains("element not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.current_step_index, 1);
        assert_eq!(plan.results.keys().collect::<Vec<_>>(), vec!["s1", "s2"]);
        assert!(recorder.0.lock().unwrap().is_empty());
        assert_eq!(plan.results["s1"].data, Some(json!("1 + 1")));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_missing_tool_name() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::tool("s1", "teleport", json!({}))]);
        let err = exec.execute_plan(&mut plan).await.unwrap_err();
        assert!(err.to_string().contains("Tool not found: teleport"));

        let mut plan = Plan::new("g", vec![Step::tool("s1", "", json!({}))]);
        let err = exec.execute_plan(&mut plan).await.unwrap_err();
        assert!(matches!(err, PlanError::ExecutionFailed { ref step_id, .. } if step_id == "s1"));
        assert_eq!(plan.results["s1"].error_message(), "Tool step missing tool name");
    }

    #[tokio::test]
    async fn test_tool_result_carries_timing() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::tool("s1", "fail", json!({}))]);
        let _ = exec.execute_plan(&mut plan).await;
        let r = &plan.results["s1"];
        assert!(!r.success);
        // 失败结果同样带 metadata
        assert!(serde_json::to_value(r).unwrap()["metadata"]
            .get("executionTimeMillis")
            .is_some());
    }

    #[tokio::test]
    async fn test_empty_plan_completes() {
        let (exec, _) = executor();
        let mut plan = Plan::new("nothing", vec![]);
        assert_eq!(exec.execute_plan(&mut plan).await.unwrap(), ExecutionOutcome::Completed);
        assert_eq!(plan.status, PlanStatus::Complete);
        assert!(plan.results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_guard_skips_wait() {
        let (exec, _) = executor();
        let mut plan = Plan::new(
            "g",
            vec![
                Step::wait("w1", Some(60_000)).with_condition("failure"),
                Step::compute("s2", "x"),
            ],
        );

        let start = tokio::time::Instant::now();
        exec.execute_plan(&mut plan).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(plan.results.len(), 2);
        assert_eq!(plan.status, PlanStatus::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_uses_default_duration() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::wait("w1", None)]);

        let start = tokio::time::Instant::now();
        exec.execute_plan(&mut plan).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(plan.results["w1"].data, Some(json!("wait completed")));
    }

    #[tokio::test]
    async fn test_ask_placeholder_returns_prompt() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::ask("q", "Which tab?")]);
        exec.execute_plan(&mut plan).await.unwrap();
        assert_eq!(plan.results["q"].data, Some(json!("Which tab?")));
    }

    struct FixedAnswer;

    #[async_trait]
    impl InputProvider for FixedAnswer {
        async fn answer(&self, _step_id: &str, _prompt: &str) -> Option<String> {
            Some("tab 2".to_string())
        }
    }

    #[tokio::test]
    async fn test_ask_uses_input_provider() {
        let (exec, recorder) = executor();
        let exec = exec.with_input_provider(Arc::new(FixedAnswer));
        let mut plan = Plan::new(
            "g",
            vec![
                Step::ask("q", "Which tab?"),
                Step::tool("s2", "record", json!({"tab": "{{q}}"})),
            ],
        );
        exec.execute_plan(&mut plan).await.unwrap();
        assert_eq!(recorder.0.lock().unwrap()[0]["tab"], "tab 2");
    }

    #[tokio::test]
    async fn test_ask_suspend_and_resume() {
        let (exec, recorder) = executor_with(ExecutorOptions {
            ask_mode: AskMode::Suspend,
            ..ExecutorOptions::default()
        });
        let mut plan = Plan::new(
            "g",
            vec![
                Step::ask("q", "Which tab?"),
                Step::tool("s2", "record", json!({"tab": "{{q}}"})),
            ],
        );

        let outcome = exec.execute_plan(&mut plan).await.unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Paused {
                step_id: "q".into(),
                prompt: "Which tab?".into()
            }
        );
        assert_eq!(plan.status, PlanStatus::Paused);
        assert_eq!(plan.pending_input.as_ref().unwrap().step_id, "q");
        assert!(exec.execute_plan(&mut plan).await.is_err());

        // 挂起的计划可以序列化保存，再恢复
        let saved = serde_json::to_string(&plan).unwrap();
        let mut plan: Plan = serde_json::from_str(&saved).unwrap();

        let outcome = exec.resume_plan(&mut plan, "tab 7").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(plan.status, PlanStatus::Complete);
        assert!(plan.pending_input.is_none());
        assert_eq!(recorder.0.lock().unwrap()[0]["tab"], "tab 7");
    }

    #[tokio::test]
    async fn test_resume_requires_paused_plan() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::compute("c", "1")]);
        assert!(matches!(
            exec.resume_plan(&mut plan, "x").await,
            Err(PlanError::InvalidPlan(_))
        ));
    }

    #[tokio::test]
    async fn test_follow_next_jumps() {
        let (exec, _) = executor_with(ExecutorOptions {
            branching: BranchMode::FollowNext,
            ..ExecutorOptions::default()
        });
        let mut plan = Plan::new(
            "g",
            vec![
                Step::compute("a", "1").with_next(NextStep::One("c".into())),
                Step::compute("b", "2"),
                Step::compute("c", "3"),
            ],
        );
        exec.execute_plan(&mut plan).await.unwrap();
        assert_eq!(plan.results.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_follow_next_rejects_unknown_target_and_cycles() {
        let (exec, _) = executor_with(ExecutorOptions {
            branching: BranchMode::FollowNext,
            ..ExecutorOptions::default()
        });

        let mut plan = Plan::new(
            "g",
            vec![Step::compute("a", "1").with_next(NextStep::One("zz".into()))],
        );
        assert!(matches!(
            exec.execute_plan(&mut plan).await,
            Err(PlanError::InvalidPlan(_))
        ));
        assert_eq!(plan.status, PlanStatus::Failed);

        let mut plan = Plan::new(
            "g",
            vec![
                Step::compute("a", "1").with_next(NextStep::One("b".into())),
                Step::compute("b", "2").with_next(NextStep::Many(vec!["a".into()])),
            ],
        );
        assert!(matches!(
            exec.execute_plan(&mut plan).await,
            Err(PlanError::InvalidPlan(_))
        ));
    }

    #[tokio::test]
    async fn test_sequential_ignores_next() {
        let (exec, _) = executor();
        let mut plan = Plan::new(
            "g",
            vec![
                Step::compute("a", "1").with_next(NextStep::One("c".into())),
                Step::compute("b", "2"),
                Step::compute("c", "3"),
            ],
        );
        exec.execute_plan(&mut plan).await.unwrap();
        assert_eq!(plan.results.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let token = CancellationToken::new();
        let (exec, _) = executor();
        let exec = exec.with_cancellation(token.clone());
        let mut plan = Plan::new(
            "g",
            vec![Step::wait("w", Some(10_000)), Step::compute("c", "1")],
        );

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let err = exec.execute_plan(&mut plan).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, PlanError::Cancelled));
        assert_eq!(plan.status, PlanStatus::Failed);
        assert!(!plan.results.contains_key("c"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (exec, _) = executor();
        exec.cancellation_token().cancel();
        let mut plan = Plan::new("g", vec![Step::compute("c", "1")]);
        assert!(matches!(
            exec.execute_plan(&mut plan).await,
            Err(PlanError::Cancelled)
        ));
        assert!(plan.results.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_plan_cannot_rerun() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::compute("c", "1")]);
        exec.execute_plan(&mut plan).await.unwrap();
        assert!(matches!(
            exec.execute_plan(&mut plan).await,
            Err(PlanError::InvalidPlan(_))
        ));
        assert_eq!(plan.status, PlanStatus::Complete);
        assert_eq!(plan.results.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_fail_the_plan() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::compute("a", "1"), Step::compute("a", "2")]);
        let err = exec.execute_plan(&mut plan).await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(ref m) if m.contains("duplicate step id: a")));
        assert_eq!(plan.status, PlanStatus::Failed);
        assert!(plan.results.is_empty());
    }

    #[test]
    fn test_ensure_runnable() {
        let (exec, _) = executor();
        let mut plan = Plan::new("g", vec![Step::compute("c", "1")]);
        assert!(exec.ensure_runnable(&plan).is_ok());
        plan.status = PlanStatus::Paused;
        assert!(exec.ensure_runnable(&plan).is_err());
        plan.status = PlanStatus::Failed;
        assert!(exec.ensure_runnable(&plan).is_err());
    }
}
