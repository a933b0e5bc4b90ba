//! 记忆层：对话消息、会话历史（内存 / SQLite）、本地文档索引与分词

pub mod conversation;
pub mod persistence;
pub mod rag;
pub mod session;
pub mod tokenizer;

pub use conversation::{format_history, recent_turns, ConversationTurn, Message, Role};
pub use persistence::SqliteSessionMemory;
pub use rag::{
    Chunker, ChunkingConfig, DocumentChunk, DocumentRetriever, RagIndex, ScoredChunk, VectorStore,
};
pub use session::{InMemorySessionMemory, SessionMemory};
