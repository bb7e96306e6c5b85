//! 参数占位符替换
//!
//! 递归遍历 tool 步骤的 input：字符串中的 `{{stepId.field}}` 按已完成步骤的结果解析。
//! - 步骤存在且字段存在 → 该字段值（字段可以是 `a.b.0` 这样的路径，数字段用于数组下标）
//! - 步骤存在且未请求字段 → 整个 result.data
//! - 其余情况 → 原样保留占位符文本
//!
//! 整个字符串恰好是一个占位符时替换为带类型的 JSON 值；嵌在文本里时替换为文本形式
//! （字符串原样，其它值 JSON 编码）。数组与对象保持结构与顺序。

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::tools::ToolResult;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap())
}

/// 对 input 做占位符替换，返回新值
pub fn substitute_parameters(input: &Value, results: &IndexMap<String, ToolResult>) -> Value {
    match input {
        Value::String(s) => substitute_str(s, results),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_parameters(v, results))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_parameters(v, results)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_str(s: &str, results: &IndexMap<String, ToolResult>) -> Value {
    let re = token_re();

    if let Some(caps) = re.captures(s) {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        if whole.len() == s.len() {
            return resolve_token(&caps[1], results).unwrap_or_else(|| Value::String(s.to_string()));
        }
    } else {
        return Value::String(s.to_string());
    }

    let replaced = re.replace_all(s, |caps: &Captures| match resolve_token(&caps[1], results) {
        Some(Value::String(text)) => text,
        Some(value) => value.to_string(),
        None => caps[0].to_string(),
    });
    Value::String(replaced.into_owned())
}

/// 解析 `stepId` 或 `stepId.path.to.field`
fn resolve_token(path: &str, results: &IndexMap<String, ToolResult>) -> Option<Value> {
    let path = path.trim();
    let (step_id, field) = match path.split_once('.') {
        Some((step, field)) => (step, Some(field)),
        None => (path, None),
    };

    let data = results.get(step_id)?.data.as_ref()?;
    match field {
        None => Some(data.clone()),
        Some(field) => field
            .split('.')
            .try_fold(data, |current, segment| match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .cloned(),
    }
}
