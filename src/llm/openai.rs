//! OpenAI 兼容 API 客户端
//!
//! 通过 reqwest 向 `{base_url}/chat/completions` 发 POST（Bearer 鉴权），可配置 base_url，
//! 支持 DeepSeek、OpenAI、自建代理等。流式响应交给 StreamDecoder；非流式响应原样转发
//! usage 与 finish_reason。429 或响应体含 `insufficient_quota` 时归为 QuotaExceeded。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::{
    AuthState, Capabilities, ChatRequest, ChatResponse, LlmClient, LlmError, StreamDecoder, Usage,
};
use crate::memory::Message;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// OpenAI 兼容客户端：持有 HTTP Client、端点、model 与 API Key
pub struct OpenAiClient {
    id: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    /// api_key 为 None 时回退到环境变量 OPENAI_API_KEY
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        Self {
            id: "openai".to_string(),
            http: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key,
            usage: TokenUsage::new(),
        }
    }

    /// 覆盖 provider id（DeepSeek 等兼容端点使用）
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.api_key = Some(api_key.into());
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// 将非 2xx 响应映射为错误：429 / insufficient_quota → QuotaExceeded，其余 → Http
pub(crate) fn classify_http_error(status: u16, body: &str) -> LlmError {
    if status == 429 || body.contains("insufficient_quota") {
        LlmError::QuotaExceeded(format!("HTTP {status}: {}", truncate(body, 300)))
    } else {
        LlmError::Http {
            status,
            message: truncate(body, 300),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", s.chars().take(max).collect::<String>())
    } else {
        s.to_string()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            model: self.model.clone(),
            streaming: true,
            max_tokens: 4096,
        }
    }

    fn auth_state(&self) -> AuthState {
        if self.api_key.is_some() {
            AuthState::Connected
        } else {
            AuthState::Disconnected
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::Auth(format!("{} API key not configured", self.id)))?;

        let body = CompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: request.stream,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text));
        }

        if request.stream {
            return StreamDecoder::new(request.on_token)
                .decode(response.bytes_stream())
                .await;
        }

        let data: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        if let Some(usage) = &data.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let first = data.choices.into_iter().next();
        let finish_reason = first.as_ref().and_then(|c| c.finish_reason.clone());
        let content = first
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            usage: data.usage,
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota() {
        assert!(classify_http_error(429, "Too Many Requests").is_quota_exhausted());
        assert!(classify_http_error(
            403,
            r#"{"error":{"code":"insufficient_quota","message":"You exceeded your current quota"}}"#
        )
        .is_quota_exhausted());
    }

    #[test]
    fn test_classify_other_http() {
        match classify_http_error(500, "oops") {
            LlmError::Http { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "oops");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_auth_error() {
        let mut client = OpenAiClient::new(Some("http://127.0.0.1:9/v1/"), "m", None);
        client.api_key = None;
        assert_eq!(client.auth_state(), AuthState::Disconnected);
        assert_eq!(client.endpoint(), "http://127.0.0.1:9/v1/chat/completions");

        let err = client
            .chat(ChatRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
    }

    #[test]
    fn test_body_wire_format() {
        let messages = vec![Message::system("s"), Message::user("u")];
        let body = CompletionBody {
            model: "m",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.5,
            stream: true,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "u");
        assert_eq!(v["stream"], true);
    }
}
