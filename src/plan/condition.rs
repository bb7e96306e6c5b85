//! 步骤守卫条件
//!
//! 条件名 → 谓词（作用于刚产生的 ToolResult）。内置 success / failure，宿主可注册更多；
//! 未注册的条件名一律视为通过。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::tools::ToolResult;

/// 守卫谓词
pub type Predicate = Arc<dyn Fn(&ToolResult) -> bool + Send + Sync>;

/// 可插拔的条件集合
#[derive(Clone)]
pub struct ConditionSet {
    predicates: HashMap<String, Predicate>,
}

impl Default for ConditionSet {
    fn default() -> Self {
        let mut set = Self::empty();
        set.register("success", |r: &ToolResult| r.success);
        set.register("failure", |r: &ToolResult| !r.success);
        set
    }
}

impl fmt::Debug for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("ConditionSet").field("conditions", &names).finish()
    }
}

impl ConditionSet {
    /// 不含内置条件的空集合
    pub fn empty() -> Self {
        Self {
            predicates: HashMap::new(),
        }
    }

    /// 注册（或覆盖）条件
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&ToolResult) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// 求值；未知条件视为通过
    pub fn evaluate(&self, condition: &str, result: &ToolResult) -> bool {
        match self.predicates.get(condition.trim()) {
            Some(predicate) => predicate(result),
            None => {
                tracing::debug!(condition, "unknown condition, treating as satisfied");
                true
            }
        }
    }
}
