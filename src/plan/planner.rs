//! Planner：目标 → 计划
//!
//! 拼 system prompt（步骤种类、输出格式 Schema、可用工具）与 user prompt（目标 + 可选上下文），
//! 以低温度、有限输出长度调用后端，再解析为步骤序列。后端额度耗尽时改用关键词兜底计划；
//! 其余后端错误作为 Provider 错误返回。

use std::sync::Arc;

use crate::core::PlanError;
use crate::llm::{ChatRequest, LlmClient, TokenCallback};
use crate::memory::Message;
use crate::plan::{create_fallback_plan, parse_plan_response, plan_schema_json, Plan};
use crate::tools::ToolDefinition;

/// 规划参数
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// 是否以流式方式调用后端
    pub stream: bool,
    /// 后端输出无法解析 / 校验失败时是否改用兜底计划（默认返回错误）
    pub fallback_on_invalid_plan: bool,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2000,
            stream: false,
            fallback_on_invalid_plan: false,
        }
    }
}

/// Planner：持有 LLM、规划参数与可用工具清单
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    options: PlannerOptions,
    tools: Vec<ToolDefinition>,
    on_token: Option<TokenCallback>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, options: PlannerOptions) -> Self {
        Self {
            llm,
            options,
            tools: Vec::new(),
            on_token: None,
        }
    }

    /// 在 prompt 中列出可用工具
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// 流式规划时接收增量 Token
    pub fn with_token_callback(mut self, callback: TokenCallback) -> Self {
        self.on_token = Some(callback);
        self
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn system_prompt(&self) -> String {
        let tools_section = if self.tools.is_empty() {
            "Tool categories available:\n\
             - browser: DOM manipulation, navigation, scraping\n\
             - communication: Gmail, Notion, Calendar\n\
             - system: clipboard, file operations\n\
             - web: API calls, web scraping"
                .to_string()
        } else {
            let lines: Vec<String> = self
                .tools
                .iter()
                .map(|t| {
                    format!(
                        "- {} [{}]: {} (parameters: {})",
                        t.name, t.category, t.description, t.parameters
                    )
                })
                .collect();
            format!("Available tools:\n{}", lines.join("\n"))
        };

        format!(
            "You are a task planning agent. Your job is to break down user goals into executable steps.\n\n\
             Available step types:\n\
             - tool: Execute a tool with parameters (fields: tool, input)\n\
             - wait: Wait for a specified time (input.duration in milliseconds)\n\
             - ask: Request user input or clarification (input.prompt)\n\
             - compute: Perform calculations or data processing (input.expression)\n\n\
             {tools_section}\n\n\
             Later steps may reference earlier results with {{{{step_id.field}}}} inside string inputs.\n\
             Any step may carry a \"condition\" (\"success\" or \"failure\") and a \"description\".\n\n\
             Format your response as a JSON array of step objects:\n\
             [\n  {{\n    \"id\": \"step_1\",\n    \"type\": \"tool\",\n    \"tool\": \"tool_name\",\n    \
             \"input\": {{ \"param1\": \"value1\" }},\n    \"description\": \"What this step does\"\n  }}\n]\n\n\
             The array must satisfy this JSON Schema:\n{schema}\n\n\
             Each step should be specific and actionable. Include user confirmation for write operations.",
            schema = plan_schema_json(),
        )
    }

    pub fn user_prompt(goal: &str, context: Option<&str>) -> String {
        let mut prompt = format!("Create a plan to: {goal}");
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\n\nContext: {ctx}"));
        }
        prompt.push_str("\n\nProvide a JSON array of steps to accomplish this goal.");
        prompt
    }

    /// 为目标生成计划（status = pending）
    pub async fn create_plan(&self, goal: &str, context: Option<&str>) -> Result<Plan, PlanError> {
        let messages = vec![
            Message::system(self.system_prompt()),
            Message::user(Self::user_prompt(goal, context)),
        ];
        let mut request = ChatRequest::new(messages)
            .temperature(self.options.temperature)
            .max_tokens(self.options.max_tokens)
            .stream(self.options.stream);
        if let Some(cb) = &self.on_token {
            request = request.on_token(cb.clone());
        }

        let response = match self.llm.chat(request).await {
            Ok(response) => response,
            Err(e) if e.is_quota_exhausted() => {
                tracing::warn!(error = %e, "backend quota exhausted, using fallback plan");
                return Ok(create_fallback_plan(goal));
            }
            Err(e) => return Err(PlanError::Provider(e)),
        };

        match parse_plan_response(&response.content) {
            Ok(steps) => {
                let plan = Plan::new(goal, steps);
                tracing::info!(plan_id = %plan.id, steps = plan.steps.len(), "plan created");
                Ok(plan)
            }
            Err(e) if self.options.fallback_on_invalid_plan => {
                tracing::warn!(error = %e, "backend plan rejected, using fallback plan");
                Ok(create_fallback_plan(goal))
            }
            Err(e) => Err(e),
        }
    }

    /// 在失败后重新规划；上下文带上失败原因、原步骤与已尝试步骤的结果，便于复用已完成的部分
    pub async fn replan(&self, plan: &Plan, failure_reason: &str) -> Result<Plan, PlanError> {
        let steps = serde_json::to_string(&plan.steps).unwrap_or_else(|_| "[]".to_string());
        let mut context = format!("Previous plan failed: {failure_reason}\nCurrent plan: {steps}");
        if !plan.results.is_empty() {
            let results = serde_json::to_string(&plan.results).unwrap_or_else(|_| "{}".to_string());
            context.push_str(&format!(
                "\nResults of attempted steps (reuse data from successful steps where possible): {results}"
            ));
        }
        self.create_plan(&plan.goal, Some(&context)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::Role;
    use crate::plan::{PlanStatus, StepKind, BROWSER_SCRAPE};
    use crate::tools::ToolResult;

    const TWO_STEPS: &str = r#"```json
[
  {"type": "tool", "tool": "browser_scrape", "input": {"selector": "h1"}},
  {"type": "tool", "tool": "echo", "input": {"text": "{{step_1}}"}}
]
```"#;

    #[tokio::test]
    async fn test_create_plan_from_backend() {
        let mock = Arc::new(MockLlmClient::new().with_reply(TWO_STEPS));
        let planner = Planner::new(mock.clone(), PlannerOptions::default());

        let plan = planner.create_plan("get the title", Some("tab 3")).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Pending);
        assert_eq!(plan.goal, "get the title");
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.current_step_index, 0);

        let req = &mock.requests()[0];
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(req.max_tokens, 2000);
        assert_eq!(req.messages[0].role, Role::System);
        assert!(req.messages[1].content.contains("Create a plan to: get the title"));
        assert!(req.messages[1].content.contains("Context: tab 3"));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_falls_back() {
        let mock = Arc::new(
            MockLlmClient::new().with_error(LlmError::QuotaExceeded("insufficient_quota".into())),
        );
        let planner = Planner::new(mock, PlannerOptions::default());

        let plan = planner
            .create_plan("scrape the headings from this page", None)
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), 1);
        match &plan.steps[0].kind {
            StepKind::Tool { tool, input } => {
                assert_eq!(tool, BROWSER_SCRAPE);
                assert_eq!(input["selector"], "h1, h2, h3");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_backend_errors_propagate() {
        let mock = Arc::new(MockLlmClient::new().with_error(LlmError::Http {
            status: 500,
            message: "boom".into(),
        }));
        let planner = Planner::new(mock, PlannerOptions::default());
        let err = planner.create_plan("scrape headings", None).await.unwrap_err();
        assert!(matches!(err, PlanError::Provider(LlmError::Http { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_unparsable_output() {
        let mock = Arc::new(MockLlmClient::new().with_reply("no plan here").with_reply("nor here"));
        let strict = Planner::new(mock.clone(), PlannerOptions::default());
        assert!(matches!(
            strict.create_plan("click it", None).await.unwrap_err(),
            PlanError::Parse(_)
        ));

        let lenient = Planner::new(
            mock,
            PlannerOptions {
                fallback_on_invalid_plan: true,
                ..PlannerOptions::default()
            },
        );
        let plan = lenient.create_plan("click it", None).await.unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_plan() {
        let mock = Arc::new(MockLlmClient::new().with_reply(TWO_STEPS));
        let planner = Planner::new(
            mock.clone(),
            PlannerOptions {
                stream: true,
                ..PlannerOptions::default()
            },
        );
        let plan = planner.create_plan("title", None).await.unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert!(mock.requests()[0].stream);
    }

    #[tokio::test]
    async fn test_replan_carries_failure_and_results() {
        let mock = Arc::new(MockLlmClient::new().with_reply(TWO_STEPS));
        let planner = Planner::new(mock.clone(), PlannerOptions::default());

        let mut failed = Plan::new("get the title", vec![]);
        failed
            .results
            .insert("step_1".into(), ToolResult::ok(serde_json::json!(["Intro"])));

        let plan = planner.replan(&failed, "selector missing").await.unwrap();
        assert_eq!(plan.goal, "get the title");
        assert_ne!(plan.id, failed.id);

        let user = &mock.requests()[0].messages[1].content;
        assert!(user.contains("Previous plan failed: selector missing"));
        assert!(user.contains("Intro"));
    }

    #[test]
    fn test_system_prompt_lists_registered_tools() {
        let planner = Planner::new(Arc::new(MockLlmClient::new()), PlannerOptions::default())
            .with_tools(vec![ToolDefinition::new("echo", "Echo text").with_category("system")]);
        let prompt = planner.system_prompt();
        assert!(prompt.contains("- echo [system]: Echo text"));
        assert!(prompt.contains("{{step_id.field}}"));
    }
}
