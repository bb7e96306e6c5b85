//! 计划层：数据模型、解析、规划、参数替换、守卫条件与执行

pub mod condition;
pub mod executor;
pub mod fallback;
pub mod parser;
pub mod planner;
pub mod schema;
pub mod substitution;
pub mod types;

pub use condition::{ConditionSet, Predicate};
pub use executor::{AskMode, BranchMode, ExecutionOutcome, Executor, ExecutorOptions, InputProvider};
pub use fallback::{create_fallback_plan, BROWSER_CLICK, BROWSER_SCRAPE};
pub use parser::{extract_steps_json, parse_plan_response};
pub use planner::{Planner, PlannerOptions};
pub use schema::plan_schema_json;
pub use substitution::substitute_parameters;
pub use types::{
    AskInput, ComputeInput, NextStep, PendingInput, Plan, PlanId, PlanStatus, Step, StepId,
    StepKind, WaitInput,
};
