//! LLM 层：客户端抽象、SSE 流式解码与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod stream;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use stream::StreamDecoder;
pub use traits::{
    AuthState, Capabilities, ChatRequest, ChatResponse, LlmClient, LlmError, TokenCallback, Usage,
};
