//! SSE 流式响应解码
//!
//! 按行切分 `data: ` 帧：`[DONE]` 为结束哨兵；其余行各自作为独立 JSON 解析，解析失败的行直接丢弃。
//! 解析成功时取 `choices[0].delta.content` 追加到累积文本，并交给 Token 回调。
//! 结束（哨兵或底层流耗尽）时 finish_reason 固定为 "stop"。
//!
//! 未以换行结尾的残行按字节保留到下一个分片，跨分片的 JSON 与 UTF-8 序列都能正确拼回。

use std::fmt;

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use super::traits::{ChatResponse, LlmError, TokenCallback};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// 流式解码器：喂入字节分片，结束时产出完整 ChatResponse
pub struct StreamDecoder {
    buffer: Vec<u8>,
    content: String,
    on_token: Option<TokenCallback>,
    done: bool,
}

impl StreamDecoder {
    pub fn new(on_token: Option<TokenCallback>) -> Self {
        Self {
            buffer: Vec::new(),
            content: String::new(),
            on_token,
            done: false,
        }
    }

    /// 已累积的文本
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 喂入一个分片；遇到 `[DONE]` 返回 true，之后的输入全部忽略
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.done {
            return true;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if self.process_line(&line) {
                self.done = true;
                self.buffer.clear();
                return true;
            }
        }
        false
    }

    /// 处理一行，返回是否为结束哨兵
    fn process_line(&mut self, line: &str) -> bool {
        let line = line.trim_end_matches('\r');
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };
        if data == DONE_SENTINEL {
            return true;
        }

        let payload: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::trace!(error = %e, "skipping unparsable stream line");
                return false;
            }
        };

        if let Some(token) = payload
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            self.content.push_str(token);
            if let Some(cb) = &self.on_token {
                cb(token);
            }
        }
        false
    }

    /// 结束解码：处理残行，finish_reason 固定为 "stop"
    pub fn finish(mut self) -> ChatResponse {
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(&rest);
        }
        ChatResponse {
            content: self.content,
            usage: None,
            finish_reason: Some("stop".to_string()),
        }
    }

    /// 消费整条字节流；哨兵出现即停止读取
    pub async fn decode<S, B, E>(mut self, stream: S) -> Result<ChatResponse, LlmError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        futures_util::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Transport(e.to_string()))?;
            if self.feed(chunk.as_ref()) {
                break;
            }
        }
        Ok(self.finish())
    }
}
