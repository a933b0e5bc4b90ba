//! 问答服务
//!
//! 供 CLI 与 HTTP API 调用的无界面入口：ask 读取会话历史 → 跑执行图 → 追加本轮问答。
//! 另外提供会话管理、检索调试与文档导入，HTTP 层只做转发。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::action::{Plan, RetrieveLimits};
use crate::core::graph::{ExecutionGraph, GraphOutcome};
use crate::core::{ContextChunk, QaError};
use crate::ingest::{self, IngestReport};
use crate::memory::{ConversationTurn, DocumentRetriever, RagIndex, SessionMemory};

/// 提问请求；session_id 缺省时使用 "default"
#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub question: String,
}

impl AskRequest {
    pub fn session_id(&self) -> &str {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SESSION)
    }
}

pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone, Serialize)]
pub struct QaResponse {
    pub session_id: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub plan: Plan,
}

/// 问答服务：启动时构建一次，通过 Arc 在请求间共享
pub struct QaService {
    graph: ExecutionGraph,
    memory: Arc<dyn SessionMemory>,
    retriever: Arc<dyn DocumentRetriever>,
    index: Arc<RagIndex>,
    limits: RetrieveLimits,
    /// HTTP 按路径导入时允许访问的根目录
    docs_root: Option<PathBuf>,
}

impl QaService {
    pub fn new(
        graph: ExecutionGraph,
        memory: Arc<dyn SessionMemory>,
        retriever: Arc<dyn DocumentRetriever>,
        index: Arc<RagIndex>,
        limits: RetrieveLimits,
    ) -> Self {
        Self {
            graph,
            memory,
            retriever,
            index,
            limits,
            docs_root: None,
        }
    }

    pub fn with_docs_root(mut self, root: Option<PathBuf>) -> Self {
        self.docs_root = root;
        self
    }

    pub async fn ask(&self, session_id: &str, question: &str) -> Result<QaResponse, QaError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::EmptyQuestion);
        }

        let history = match self.memory.history(session_id).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to read session history, continuing without it");
                Vec::new()
            }
        };

        let GraphOutcome {
            answer,
            sources,
            plan,
            ..
        } = self.graph.run(session_id, question, history).await?;

        let turn = ConversationTurn::new(question, answer.clone(), sources.clone());
        if let Err(e) = self.memory.append_turn(session_id, turn).await {
            tracing::warn!(session_id, error = %e, "failed to append turn to session history");
        }

        Ok(QaResponse {
            session_id: session_id.to_string(),
            answer,
            sources,
            plan,
        })
    }

    pub async fn ask_request(&self, req: &AskRequest) -> Result<QaResponse, QaError> {
        self.ask(req.session_id(), &req.question).await
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<ConversationTurn>, QaError> {
        self.memory
            .history(session_id)
            .await
            .map_err(|e| QaError::Storage(e.to_string()))
    }

    pub async fn clear(&self, session_id: &str) -> Result<(), QaError> {
        self.memory
            .clear(session_id)
            .await
            .map_err(|e| QaError::Storage(e.to_string()))?;
        tracing::info!(session_id, "session cleared");
        Ok(())
    }

    /// 直接查看检索结果（不经过规划与综合）；k 缺省为 default_k，并限制在 [1, max_k]
    pub async fn retrieve_debug(&self, query: &str, k: Option<usize>) -> Result<Vec<ContextChunk>, QaError> {
        let k = k
            .unwrap_or(self.limits.default_k)
            .clamp(1, self.limits.max_k);
        self.retriever
            .search(query, k)
            .await
            .map_err(QaError::Retrieval)
    }

    pub async fn ingest_path(&self, path: impl AsRef<Path>) -> Result<IngestReport, QaError> {
        ingest::ingest_path(&self.index, path.as_ref()).await
    }

    /// 按路径导入，但路径必须落在文档根目录（retrieval.docs_dir）之内；未配置根目录时拒绝
    pub async fn ingest_docs_path(&self, path: impl AsRef<Path>) -> Result<IngestReport, QaError> {
        let root = self.docs_root.as_deref().ok_or_else(|| {
            QaError::Ingestion("path ingestion is disabled: retrieval.docs_dir is not set".to_string())
        })?;
        ingest::ingest_path_within(&self.index, root, path.as_ref()).await
    }

    /// 导入一批上传文件（文件名, 内容），逐个记录结果
    pub async fn ingest_uploads(&self, files: Vec<(String, Vec<u8>)>) -> IngestReport {
        let mut report = IngestReport::default();
        for (name, bytes) in files {
            report.push(ingest::ingest_bytes(&self.index, &name, bytes).await);
        }
        tracing::info!(
            files = report.files.len(),
            chunks = report.total_chunks,
            "upload ingestion finished"
        );
        report
    }

    pub async fn ingest_text(&self, doc_id: &str, text: &str) -> Result<usize, QaError> {
        ingest::ingest_text(&self.index, doc_id, text).await
    }

    /// 清空本地索引，返回删除的块数
    pub async fn clear_index(&self) -> usize {
        let n = self.index.clear().await;
        tracing::info!(deleted_chunks = n, "index cleared");
        n
    }

    /// (块数, 文档数)
    pub async fn index_stats(&self) -> (usize, usize) {
        self.index.stats().await
    }
}

/// 从配置文件构建服务
///
/// 显式指定的配置文件缺失或无法解析时返回 `QaError::Config`；只有默认配置加载失败才回落到内置默认值。
pub async fn create_service_from_config(config_path: Option<PathBuf>) -> anyhow::Result<QaService> {
    let explicit = config_path.is_some();
    let cfg = match crate::config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) if explicit => return Err(QaError::Config(e.to_string()).into()),
        Err(e) => {
            tracing::warn!("Config load failed ({}), using defaults", e);
            crate::config::AppConfig::default()
        }
    };
    let docs_dir = cfg.retrieval.docs_dir.clone();
    let service = crate::core::builder::QaServiceBuilder::new(cfg).build()?;

    if let Some(dir) = docs_dir {
        match service.ingest_path(&dir).await {
            Ok(report) => tracing::info!(
                dir = %dir.display(),
                chunks = report.total_chunks,
                "preloaded documents"
            ),
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "failed to preload documents"),
        }
    }
    Ok(service)
}
