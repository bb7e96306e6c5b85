//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::chat：一次调用产出一个 ChatResponse，
//! 流式与否由 ChatRequest::stream 决定；流式时每个增量 Token 交给 on_token 回调。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;

/// 增量 Token 回调
pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// 一次对话请求
#[derive(Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub on_token: Option<TokenCallback>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: 0.7,
            max_tokens: 1000,
            stream: false,
            on_token: None,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn on_token(mut self, callback: TokenCallback) -> Self {
        self.on_token = Some(callback);
        self
    }
}

impl fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRequest")
            .field("messages", &self.messages.len())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream", &self.stream)
            .field("on_token", &self.on_token.is_some())
            .finish()
    }
}

/// Token 用量（单次响应）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 一次对话的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

/// 后端能力描述
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub model: String,
    pub streaming: bool,
    pub max_tokens: u32,
}

/// 鉴权状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Connected,
    Disconnected,
}

/// 后端调用错误；QuotaExceeded 单独区分，供 Planner 切换兜底计划
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

impl LlmError {
    /// 额度 / 速率耗尽
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, LlmError::QuotaExceeded(_))
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 后端标识（也用作鉴权 Token 的 provider id）
    fn id(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn auth_state(&self) -> AuthState {
        AuthState::Connected
    }

    /// 发起一次对话
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
