//! 问答错误类型
//!
//! 只有综合（Reader）失败会上抛给调用方；规划、检索、联网搜索的失败都在编排内部降级处理。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] LlmError),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("Empty question")]
    EmptyQuestion,

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Config error: {0}")]
    Config(String),
}
