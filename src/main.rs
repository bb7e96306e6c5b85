//! stepwise：目标 → 计划 → 执行
//!
//! 用法：`stepwise [--config <path>] <goal...>`。加载配置、初始化日志、以演示工具构建运行时，
//! 执行目标后把最终计划以 JSON 打印到 stdout。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use stepwise::{
    agent::AgentRuntime,
    config::load_config,
    observability,
    tools::{EchoTool, ToolRegistry},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut goal_words = Vec::new();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = Some(args.next().context("--config requires a path")?.into());
        } else {
            goal_words.push(arg);
        }
    }
    let goal = goal_words.join(" ");
    if goal.trim().is_empty() {
        bail!("usage: stepwise [--config <path>] <goal>");
    }

    let cfg = load_config(config_path).context("Failed to load config")?;

    let registry = Arc::new(ToolRegistry::new());
    registry.register(EchoTool);

    let runtime =
        AgentRuntime::from_config(&cfg, registry).context("Failed to build agent runtime")?;

    let outcome = runtime.run_goal(&goal).await;
    // 失败时同样打印已保存的计划（含部分结果）
    let plan = match (&outcome, runtime.active_plan()) {
        (Ok(plan), _) => Some(plan.clone()),
        (Err(_), Ok(active)) => active,
        (Err(_), Err(_)) => None,
    };
    if let Some(plan) = plan {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    }

    outcome.context("Plan execution failed")?;
    Ok(())
}
