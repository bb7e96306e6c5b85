//! Headless Agent 运行时
//!
//! 把 Planner、Executor 与持久化协作方串起来：
//! create_plan 生成计划并存为当前活动计划，execute_plan / resume_plan 执行并为每个尝试过的步骤
//! 追加一条执行记录，run_goal 在执行失败时带着部分结果重新规划（最多 max_replans 次）。
//! 无论成功、失败还是挂起，计划的最终状态都会写回存储。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::config::{AppConfig, StorageBackend};
use crate::core::{PlanError, StoreError};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{ExecutionHistory, InMemoryStore, MemoryStore, SqliteStore};
use crate::plan::{ExecutionOutcome, Executor, Plan, Planner};
use crate::tools::{ToolExecutor, ToolRegistry};

/// 运行时：Planner + Executor + 存储
pub struct AgentRuntime {
    planner: Planner,
    executor: Executor,
    store: Arc<dyn MemoryStore>,
    max_replans: u32,
}

impl AgentRuntime {
    pub fn new(planner: Planner, executor: Executor, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            planner,
            executor,
            store,
            max_replans: 1,
        }
    }

    pub fn with_max_replans(mut self, max_replans: u32) -> Self {
        self.max_replans = max_replans;
        self
    }

    /// 按配置组装：存储后端、LLM 后端、规划与执行参数；Planner 的 prompt 列出 registry 中的工具
    pub fn from_config(cfg: &AppConfig, registry: Arc<ToolRegistry>) -> Result<Self, PlanError> {
        let store = open_store(cfg)?;
        let llm = create_llm_from_config(cfg, store.as_ref());

        let planner =
            Planner::new(llm, cfg.planner_options()).with_tools(registry.tool_definitions());
        let executor = Executor::new(
            ToolExecutor::new(registry, cfg.executor.tool_timeout_secs),
            cfg.executor_options(),
        );

        Ok(Self::new(planner, executor, store).with_max_replans(cfg.planner.max_replans))
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// 当前活动计划
    pub fn active_plan(&self) -> Result<Option<Plan>, PlanError> {
        Ok(self.store.agent_state()?.and_then(|s| s.active_plan))
    }

    /// 生成计划并设为活动计划
    pub async fn create_plan(&self, goal: &str, context: Option<&str>) -> Result<Plan, PlanError> {
        let plan = self.planner.create_plan(goal, context).await?;
        self.save_active(&plan)?;
        Ok(plan)
    }

    /// 执行活动计划。挂起时返回 status = paused 的计划；失败时计划以 failed 状态保存后返回错误
    pub async fn execute_plan(&self, plan_id: &str) -> Result<Plan, PlanError> {
        let mut plan = self.load_active(plan_id)?;
        // 被拒绝的计划没有新尝试的步骤，不写历史也不改存储
        self.executor.ensure_runnable(&plan)?;
        let outcome = self.executor.execute_plan(&mut plan).await;
        self.finish(plan, 0, outcome)
    }

    /// 以外部回答恢复挂起的活动计划
    pub async fn resume_plan(&self, plan_id: &str, answer: &str) -> Result<Plan, PlanError> {
        let mut plan = self.load_active(plan_id)?;
        let from = plan
            .pending_input
            .as_ref()
            .and_then(|p| plan.results.get_index_of(&p.step_id))
            .unwrap_or(plan.results.len());
        let outcome = self.executor.resume_plan(&mut plan, answer).await;
        self.finish(plan, from, outcome)
    }

    /// 目标 → 计划 → 执行；步骤失败时基于失败原因与部分结果重新规划
    pub async fn run_goal(&self, goal: &str) -> Result<Plan, PlanError> {
        let mut plan = self.create_plan(goal, None).await?;
        let mut replans = 0;

        loop {
            match self.execute_plan(&plan.id).await {
                Ok(done) => return Ok(done),
                Err(e @ PlanError::ExecutionFailed { .. }) if replans < self.max_replans => {
                    replans += 1;
                    tracing::warn!(plan_id = %plan.id, error = %e, attempt = replans, "Replanning");
                    let failed = self.load_active(&plan.id)?;
                    plan = self.planner.replan(&failed, &e.to_string()).await?;
                    self.save_active(&plan)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 记录本次新尝试的步骤（results 中下标 >= from 的部分），保存计划，再转交执行结果。
    /// 挂起中的 ask 步骤只有占位结果，等恢复时连同回答一起记录
    fn finish(
        &self,
        plan: Plan,
        from: usize,
        outcome: Result<ExecutionOutcome, PlanError>,
    ) -> Result<Plan, PlanError> {
        let awaiting = plan.pending_input.as_ref().map(|p| p.step_id.as_str());
        for (step_id, result) in plan.results.iter().skip(from) {
            if Some(step_id.as_str()) == awaiting {
                continue;
            }
            let kind = plan
                .step_index(step_id)
                .map(|i| plan.steps[i].kind.name())
                .unwrap_or("unknown");
            let record = ExecutionHistory::new(&plan.id, step_id, result.clone())
                .with_metadata("kind", json!(kind))
                .with_metadata("goal", json!(plan.goal));
            self.store.add_execution_history(record)?;
        }
        self.save_active(&plan)?;
        outcome.map(|_| plan)
    }

    fn load_active(&self, plan_id: &str) -> Result<Plan, PlanError> {
        self.active_plan()?
            .filter(|p| p.id == plan_id)
            .ok_or_else(|| PlanError::NotFound(format!("plan {plan_id}")))
    }

    fn save_active(&self, plan: &Plan) -> Result<(), PlanError> {
        let mut state = self.store.agent_state()?.unwrap_or_default();
        state.active_plan = Some(plan.clone());
        self.store.save_agent_state(state)?;
        Ok(())
    }
}

/// 按 [storage] 打开存储
pub fn open_store(cfg: &AppConfig) -> Result<Arc<dyn MemoryStore>, StoreError> {
    Ok(match cfg.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryStore::new()),
        StorageBackend::Sqlite => {
            tracing::info!(path = %cfg.storage.path.display(), "Using SQLite store");
            Arc::new(SqliteStore::open(&cfg.storage.path)?)
        }
    })
}

/// 按配置选择 LLM 后端
///
/// API Key 依次取：配置 [llm].api_key → 环境变量 → 存储中该 provider 未过期的认证令牌；
/// 都没有（或 provider 为 mock / 未知）时使用 Mock。
pub fn create_llm_from_config(cfg: &AppConfig, store: &dyn MemoryStore) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let env_keys: &[&str] = match provider.as_str() {
        "openai" => &["OPENAI_API_KEY"][..],
        "deepseek" => &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"][..],
        "mock" => return Arc::new(MockLlmClient::new()),
        other => {
            tracing::warn!("Unknown LLM provider '{}', using Mock LLM", other);
            return Arc::new(MockLlmClient::new());
        }
    };

    let api_key = cfg
        .llm
        .api_key
        .clone()
        .or_else(|| env_keys.iter().find_map(|k| std::env::var(k).ok()))
        .or_else(|| stored_token(store, &provider));
    let Some(api_key) = api_key else {
        tracing::warn!("No API key for provider '{}', using Mock LLM", provider);
        return Arc::new(MockLlmClient::new());
    };

    let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);
    if provider == "deepseek" {
        let client = create_deepseek_client(cfg.llm.model.as_deref(), Some(&api_key));
        tracing::info!("Using DeepSeek LLM");
        Arc::new(client.with_timeout(timeout))
    } else {
        let model = cfg
            .llm
            .model
            .clone()
            .unwrap_or_else(|| crate::llm::openai::OPENAI_DEFAULT_MODEL.to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(
            OpenAiClient::new(cfg.llm.base_url.as_deref(), &model, Some(&api_key))
                .with_timeout(timeout),
        )
    }
}

fn stored_token(store: &dyn MemoryStore, provider: &str) -> Option<String> {
    match store.auth_token(provider) {
        Ok(Some(token)) if !token.is_expired(chrono::Utc::now()) => Some(token.token),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read auth token");
            None
        }
    }
}
