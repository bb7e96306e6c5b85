//! 关键词兜底计划
//!
//! 后端不可用（额度耗尽等）时，按目标文本中的关键词（大小写不敏感）生成确定性的单步计划。

use serde_json::json;

use crate::plan::{Plan, Step};

pub const BROWSER_SCRAPE: &str = "browser_scrape";
pub const BROWSER_CLICK: &str = "browser_click";

/// 生成兜底计划
///
/// - extract / scrape + head / title → 提取标题（h1, h2, h3）
/// - extract / scrape + link → 提取链接
/// - extract / scrape → 提取 body 文本
/// - click → 点击第一个按钮或链接
/// - 其它 → 提取 body 文本
pub fn create_fallback_plan(goal: &str) -> Plan {
    let lower = goal.to_lowercase();
    let has = |kw: &str| lower.contains(kw);

    let step = if has("extract") || has("scrape") {
        if has("head") || has("title") {
            scrape_step("h1, h2, h3", "Extract all headings from the page")
        } else if has("link") {
            scrape_step("a", "Extract all links from the page")
        } else {
            scrape_step("body", "Extract text content from the page")
        }
    } else if has("click") {
        Step::tool("step_1", BROWSER_CLICK, json!({ "selector": "button, a" }))
            .with_description("Click the first button or link found")
    } else {
        scrape_step("body", "Extract page content")
    };

    Plan::new(goal, vec![step])
}

fn scrape_step(selector: &str, description: &str) -> Step {
    Step::tool(
        "step_1",
        BROWSER_SCRAPE,
        json!({ "selector": selector, "textOnly": true }),
    )
    .with_description(description)
}
