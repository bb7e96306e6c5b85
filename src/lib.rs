//! Stepwise - 计划执行引擎
//!
//! 把自然语言目标变成有类型的步骤序列，并在可插拔的工具集上逐步执行。
//!
//! 模块划分：
//! - **agent**: 无头运行时（Planner + Executor + 持久化，失败重规划）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象、SSE 流式解码与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息与持久化协作方（内存 / SQLite）
//! - **observability**: 日志初始化
//! - **plan**: 计划模型、解析、规划、参数替换、守卫条件与执行器
//! - **tools**: 工具契约、注册表与带超时的工具执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod tools;

pub use agent::AgentRuntime;
pub use core::{PlanError, StoreError};
pub use plan::{Executor, Plan, PlanStatus, Planner, Step, StepKind};
