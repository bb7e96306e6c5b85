//! 后端输出 → 步骤序列
//!
//! 先找围栏代码块（优先 ```json），否则找第一个能解析成 JSON 数组的顶层 `[...]`；
//! 都没有或内容不是合法 JSON 时返回 PlanError::Parse。解析后补默认 id（step_{n}，从 1 起）
//! 与默认 next（后一步的 id，最后一步除外），并检查 id 唯一。

use serde_json::Value;

use crate::core::PlanError;
use crate::plan::types::ensure_unique_ids;
use crate::plan::{NextStep, Step};

/// 取第一个围栏代码块的内容；优先 json 标注的块
fn fenced_block(text: &str) -> Option<&str> {
    let block_after = |start: usize| -> Option<&str> {
        let rest = &text[start..];
        // 跳过语言标注行
        let body_start = rest.find('\n').map(|i| i + 1)?;
        let body = &rest[body_start..];
        body.find("```").map(|end| body[..end].trim())
    };

    if let Some(start) = text.find("```json") {
        if let Some(body) = block_after(start) {
            return Some(body);
        }
    }
    text.find("```").and_then(block_after)
}

/// 从 start 处的 `[` 起找配对的 `]`，跳过字符串内的括号
fn balanced_array(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 第一个能解析为 JSON 数组的顶层 `[...]`
fn first_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[')
        .filter_map(|(i, _)| balanced_array(text, i))
        .find_map(|candidate| serde_json::from_str::<Vec<Value>>(candidate).ok())
}

/// 从文本中提取原始步骤数组
pub fn extract_steps_json(text: &str) -> Result<Vec<Value>, PlanError> {
    if let Some(block) = fenced_block(text) {
        return serde_json::from_str::<Vec<Value>>(block)
            .map_err(|e| PlanError::Parse(format!("fenced block is not a JSON array: {e}")));
    }
    first_array(text).ok_or_else(|| PlanError::Parse("No valid JSON found in response".to_string()))
}

/// 解析后端输出为步骤序列，补齐默认 id 与 next
pub fn parse_plan_response(text: &str) -> Result<Vec<Step>, PlanError> {
    let raw = extract_steps_json(text)?;

    let mut steps = Vec::with_capacity(raw.len());
    for (index, mut value) in raw.into_iter().enumerate() {
        let Some(obj) = value.as_object_mut() else {
            return Err(PlanError::Parse(format!("step {} is not an object", index + 1)));
        };
        let has_id = obj
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.trim().is_empty());
        if !has_id {
            obj.insert("id".to_string(), Value::String(format!("step_{}", index + 1)));
        }

        let step: Step = serde_json::from_value(value)
            .map_err(|e| PlanError::Parse(format!("step {}: {e}", index + 1)))?;
        steps.push(step);
    }

    let next_ids: Vec<Option<String>> = steps
        .iter()
        .skip(1)
        .map(|s| Some(s.id.clone()))
        .chain(std::iter::once(None))
        .collect();
    for (step, next_id) in steps.iter_mut().zip(next_ids) {
        if step.next.is_none() {
            step.next = next_id.map(NextStep::One);
        }
    }

    ensure_unique_ids(&steps)?;
    Ok(steps)
}
