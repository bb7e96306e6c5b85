//! 记忆层：对话消息与持久化协作方（执行历史、会话、Agent 状态、偏好、认证令牌）

pub mod conversation;
pub mod store;

pub use conversation::{Conversation, ConversationMessage, ConversationMetadata, Message, Role};
pub use store::{
    AgentState, AuthToken, ExecutionHistory, InMemoryStore, MemoryExport, MemoryStore,
    SqliteStore, Theme, UserPreferences,
};
