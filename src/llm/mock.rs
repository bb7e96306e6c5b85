//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预置回复或错误；脚本耗尽后把最后一条 User 消息包装成单步 echo 计划。
//! 流式请求会把回复切成 SSE 帧走一遍 StreamDecoder，与真实后端的流式路径一致。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;

use crate::llm::{Capabilities, ChatRequest, ChatResponse, LlmClient, LlmError, StreamDecoder};
use crate::memory::{Message, Role};

/// 请求快照（供测试断言）
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条成功回复
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        lock(&self.script).push_back(Ok(content.into()));
        self
    }

    /// 追加一次失败
    pub fn with_error(self, error: LlmError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// 已收到的请求
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    fn default_reply(messages: &[Message]) -> String {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        serde_json::json!([{
            "id": "step_1",
            "type": "tool",
            "tool": "echo",
            "input": { "text": format!("Echo from Mock: {last_user}") },
            "description": "Echo the request"
        }])
        .to_string()
    }
}

/// 把文本切成若干 SSE 帧（每帧最多 8 个字符）并以 [DONE] 结尾
fn sse_frames(content: &str) -> Vec<Result<Bytes, LlmError>> {
    let chars: Vec<char> = content.chars().collect();
    let mut frames: Vec<Result<Bytes, LlmError>> = chars
        .chunks(8)
        .map(|c| {
            let piece: String = c.iter().collect();
            let payload = serde_json::json!({ "choices": [{ "delta": { "content": piece } }] });
            Ok(Bytes::from(format!("data: {payload}\n\n")))
        })
        .collect();
    frames.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));
    frames
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn id(&self) -> &str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            model: "mock".to_string(),
            streaming: true,
            max_tokens: 4096,
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LlmError> {
        lock(&self.requests).push(RecordedRequest {
            messages: request.messages.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: request.stream,
        });

        let scripted = lock(&self.script).pop_front();
        let content = match scripted {
            Some(reply) => reply?,
            None => Self::default_reply(&request.messages),
        };

        if request.stream {
            return StreamDecoder::new(request.on_token)
                .decode(stream::iter(sse_frames(&content)))
                .await;
        }

        Ok(ChatResponse {
            content,
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }
}
