//! 计划步骤 JSON Schema 生成（schemars 自动生成）
//!
//! 将「合法步骤数组」的 JSON 结构注入规划 system prompt，减少 LLM 输出格式错误。

use schemars::schema_for;

use crate::plan::Step;

/// 返回步骤数组的 JSON Schema 字符串，可拼入 system prompt
pub fn plan_schema_json() -> String {
    let schema = schema_for!(Vec<Step>);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
