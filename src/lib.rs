//! DocQA - 文档 + 联网混合问答
//!
//! 模块划分：
//! - **agent**: 问答服务 QaService（供 CLI / HTTP 调用）
//! - **agents**: 规划、检索、综合三个代理
//! - **api**: HTTP 路由（feature = "web"）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 动作模型、上下文累积、回退判定、执行图与构建器
//! - **ingest**: 文档导入
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / OpenRouter / Mock）与嵌入
//! - **memory**: 会话历史（内存 / SQLite）、本地文档索引与分词
//! - **web_search**: 联网搜索（SearchAPI / DuckDuckGo）

pub mod agent;
pub mod agents;
#[cfg(feature = "web")]
pub mod api;
pub mod config;
pub mod core;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod web_search;

pub use agent::{create_service_from_config, AskRequest, QaResponse, QaService};
