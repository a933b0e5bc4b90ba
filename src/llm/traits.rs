//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete。
//! 核心不做重试：失败直接以 LlmError 返回，由调用方决定降级还是上抛。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// 传输层或非 2xx 响应
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；structured=true 表示调用方期望可解析的 JSON，实现应尽量给出确定性输出
    async fn complete(&self, messages: &[Message], structured: bool) -> Result<String, LlmError>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }
}
