//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEPWISE__*` 覆盖（双下划线表示嵌套，如 `STEPWISE__LLM__PROVIDER=openai`）。
//! 所有字段都有默认值，空配置即可运行（无 Key 时走 Mock 后端）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::plan::{AskMode, BranchMode, ExecutorOptions, PlannerOptions};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub planner: PlannerSection,
    pub executor: ExecutorSection,
    pub storage: StorageSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    /// 未设置时按后端取默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 未设置时依次尝试环境变量、已保存的认证令牌
    pub api_key: Option<String>,
    /// 规划请求是否走流式
    pub stream: bool,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            stream: false,
            request_timeout_secs: 60,
        }
    }
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub temperature: f32,
    pub max_tokens: u32,
    /// 后端输出无法解析时改用关键词兜底计划
    pub fallback_on_invalid_plan: bool,
    /// 执行失败后最多重新规划几次
    pub max_replans: u32,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 2000,
            fallback_on_invalid_plan: false,
            max_replans: 1,
        }
    }
}

/// [executor] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub default_wait_ms: u64,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub branching: BranchMode,
    pub ask_mode: AskMode,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            default_wait_ms: 1000,
            tool_timeout_secs: 30,
            branching: BranchMode::Sequential,
            ask_mode: AskMode::Placeholder,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// [storage] 段：持久化后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// SQLite 文件路径
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("data/stepwise.db"),
        }
    }
}

impl AppConfig {
    pub fn planner_options(&self) -> PlannerOptions {
        PlannerOptions {
            temperature: self.planner.temperature,
            max_tokens: self.planner.max_tokens,
            stream: self.llm.stream,
            fallback_on_invalid_plan: self.planner.fallback_on_invalid_plan,
        }
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            default_wait_ms: self.executor.default_wait_ms,
            branching: self.executor.branching,
            ask_mode: self.executor.ask_mode,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEPWISE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEPWISE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEPWISE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（调用方决定是否用新配置重建运行时）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "openai");
        assert!((cfg.planner.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(cfg.planner.max_tokens, 2000);
        assert_eq!(cfg.executor.default_wait_ms, 1000);
        assert_eq!(cfg.executor.branching, BranchMode::Sequential);
        assert_eq!(cfg.executor.ask_mode, AskMode::Placeholder);
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "mock"
stream = true

[planner]
fallback_on_invalid_plan = true

[executor]
branching = "follow_next"
ask_mode = "suspend"

[storage]
backend = "sqlite"
path = "/tmp/x.db"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert!(cfg.planner_options().stream);
        assert!(cfg.planner_options().fallback_on_invalid_plan);
        assert_eq!(cfg.planner.max_tokens, 2000);
        assert_eq!(cfg.executor_options().branching, BranchMode::FollowNext);
        assert_eq!(cfg.executor_options().ask_mode, AskMode::Suspend);
        assert_eq!(cfg.storage.backend, StorageBackend::Sqlite);
    }
}
