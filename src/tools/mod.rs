//! 工具层：能力契约、注册表、带超时的执行器

pub mod echo;
pub mod executor;
pub mod registry;
pub mod types;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use types::{
    ToolCall, ToolDefinition, ToolError, ToolMetadata, ToolResult, ValidationReport,
    DEFAULT_CATEGORY,
};
