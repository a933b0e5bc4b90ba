//! 服务构建器：从 AppConfig 组装 LLM、索引、联网搜索、会话存储与执行图
//!
//! 各协作方都可以通过 with_* 注入替身（测试用），未注入的按配置创建。

use std::sync::Arc;
use std::time::Duration;

use crate::agent::QaService;
use crate::agents::{PlanGenerator, Reader, RetrieverAgent};
use crate::config::{load_prompt_override, AppConfig};
use crate::core::action::RetrieveLimits;
use crate::core::error::QaError;
use crate::core::fallback::FallbackController;
use crate::core::graph::ExecutionGraph;
use crate::llm::{
    create_deepseek_client, create_embedder_from_config, create_openrouter_client, LlmClient,
    MockLlmClient, OpenAiClient,
};
use crate::memory::{
    ChunkingConfig, DocumentRetriever, InMemorySessionMemory, RagIndex, SessionMemory,
    SqliteSessionMemory,
};
use crate::web_search::{HttpWebSearch, SearchProvider, WebSearch};

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|k| !k.trim().is_empty())
}

/// 按 provider 与可用的 API Key 选择 LLM 后端；都不满足时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig, model: &str) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            return Arc::new(MockLlmClient::new());
        }
        "openrouter" if env_key("OPENROUTER_API_KEY").is_some() => {
            tracing::info!("Using OpenRouter LLM ({})", model);
            return Arc::new(create_openrouter_client(model));
        }
        "deepseek" if env_key("DEEPSEEK_API_KEY").is_some() || env_key("OPENAI_API_KEY").is_some() => {
            tracing::info!("Using DeepSeek LLM ({})", model);
            return Arc::new(create_deepseek_client(Some(model)));
        }
        "openai" if env_key("OPENAI_API_KEY").is_some() => {
            tracing::info!("Using OpenAI LLM ({})", model);
            return Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), model, None));
        }
        _ => {}
    }
    tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
    Arc::new(MockLlmClient::new())
}

pub struct QaServiceBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    planner_llm: Option<Arc<dyn LlmClient>>,
    index: Option<Arc<RagIndex>>,
    retriever: Option<Arc<dyn DocumentRetriever>>,
    web: Option<Arc<dyn WebSearch>>,
    memory: Option<Arc<dyn SessionMemory>>,
}

impl QaServiceBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            planner_llm: None,
            index: None,
            retriever: None,
            web: None,
            memory: None,
        }
    }

    /// 综合与规划共用的 LLM（规划可再用 with_planner_llm 单独指定）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_planner_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.planner_llm = Some(llm);
        self
    }

    pub fn with_index(mut self, index: Arc<RagIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// 替换执行图使用的检索服务（默认即本地索引）
    pub fn with_retriever(mut self, retriever: Arc<dyn DocumentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_web_search(mut self, web: Arc<dyn WebSearch>) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_session_memory(mut self, memory: Arc<dyn SessionMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn limits(&self) -> RetrieveLimits {
        let max_k = self.config.retrieval.max_k.max(1);
        RetrieveLimits {
            default_k: self.config.retrieval.default_k.clamp(1, max_k),
            max_k,
        }
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.orchestrator.call_timeout_secs.max(1))
    }

    /// LLM 调用取编排超时与 HTTP 请求超时中较小者
    fn llm_timeout(&self) -> Duration {
        let request = Duration::from_secs(self.config.llm.timeouts.request.max(1));
        self.call_timeout().min(request)
    }

    pub fn build_index(&self) -> Arc<RagIndex> {
        if let Some(index) = &self.index {
            return index.clone();
        }
        let r = &self.config.retrieval;
        let embedder = create_embedder_from_config(
            r.embeddings_enabled,
            r.embedding_base_url.as_deref(),
            &r.embedding_model,
        );
        Arc::new(
            RagIndex::new(r.max_entries, embedder).with_chunking_config(ChunkingConfig {
                chunk_size: r.chunk_size,
                chunk_overlap: r.chunk_overlap.min(r.chunk_size / 2),
                ..ChunkingConfig::default()
            }),
        )
    }

    pub fn build_web_search(&self) -> Arc<dyn WebSearch> {
        if let Some(web) = &self.web {
            return web.clone();
        }
        let w = &self.config.web_search;
        let provider = SearchProvider::from_config(&w.provider, w.searchapi_api_key.as_deref());
        tracing::info!(provider = provider_name(&provider), "web search configured");
        Arc::new(HttpWebSearch::new(provider, w.timeout_secs, w.max_result_chars))
    }

    pub fn build_session_memory(&self) -> anyhow::Result<Arc<dyn SessionMemory>> {
        if let Some(memory) = &self.memory {
            return Ok(memory.clone());
        }
        let m = &self.config.memory;
        match m.backend.to_lowercase().as_str() {
            "sqlite" => {
                tracing::info!(path = %m.sqlite_path.display(), "Using SQLite session store");
                Ok(Arc::new(SqliteSessionMemory::open(&m.sqlite_path, m.max_turns)?))
            }
            "memory" => Ok(Arc::new(InMemorySessionMemory::new(m.max_turns))),
            other => Err(QaError::Config(format!("unknown memory backend: {}", other)).into()),
        }
    }

    pub fn build_graph(&self, retriever: Arc<dyn DocumentRetriever>) -> ExecutionGraph {
        let llm = self
            .llm
            .clone()
            .unwrap_or_else(|| create_llm_from_config(&self.config, &self.config.llm.model));
        let planner_llm = match (&self.planner_llm, &self.config.llm.planner_model) {
            (Some(p), _) => p.clone(),
            (None, Some(model)) if self.llm.is_none() => create_llm_from_config(&self.config, model),
            _ => llm.clone(),
        };
        let history_turns = self.config.app.max_history_turns;

        let mut planner = PlanGenerator::new(planner_llm, self.limits())
            .with_history_turns(history_turns)
            .with_timeout(self.llm_timeout());
        if let Some(template) = load_prompt_override("planner") {
            tracing::info!("Using planner prompt from config/prompts/planner.txt");
            planner = planner.with_prompt_template(template);
        }

        let mut reader = Reader::new(llm)
            .with_history_turns(history_turns)
            .with_timeout(self.llm_timeout());
        if let Some(template) = load_prompt_override("reader") {
            tracing::info!("Using reader prompt from config/prompts/reader.txt");
            reader = reader.with_prompt_template(template);
        }

        let retriever = RetrieverAgent::new(retriever)
            .with_history_turns(self.config.retrieval.history_turns_for_query)
            .with_timeout(self.call_timeout());

        ExecutionGraph::new(planner, retriever, self.build_web_search(), reader)
            .with_fallback(FallbackController::new(
                &self.config.orchestrator.insufficiency_phrases,
            ))
            .with_web_timeout(self.call_timeout())
    }

    pub fn build(self) -> anyhow::Result<QaService> {
        let index = self.build_index();
        let retriever: Arc<dyn DocumentRetriever> = match &self.retriever {
            Some(r) => r.clone(),
            None => index.clone(),
        };
        let memory = self.build_session_memory()?;
        let graph = self.build_graph(retriever.clone());
        Ok(QaService::new(graph, memory, retriever, index, self.limits())
            .with_docs_root(self.config.retrieval.docs_dir.clone()))
    }
}

fn provider_name(provider: &SearchProvider) -> &'static str {
    match provider {
        SearchProvider::DuckDuckGo => "duckduckgo",
        SearchProvider::SearchApi { .. } => "searchapi",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        assert_eq!(create_llm_from_config(&cfg, "any").model_name(), "mock");
    }

    #[test]
    fn test_limits_are_sane() {
        let mut cfg = AppConfig::default();
        cfg.retrieval.default_k = 50;
        cfg.retrieval.max_k = 10;
        let builder = QaServiceBuilder::new(cfg);
        let limits = builder.limits();
        assert_eq!(limits.default_k, 10);
        assert_eq!(limits.max_k, 10);
    }

    #[test]
    fn test_unknown_memory_backend_is_an_error() {
        let mut cfg = AppConfig::default();
        cfg.memory.backend = "redis".into();
        let err = QaServiceBuilder::new(cfg).build_session_memory().err().unwrap();
        assert!(matches!(err.downcast_ref::<QaError>(), Some(QaError::Config(_))));
    }

    #[test]
    fn test_sqlite_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.memory.backend = "sqlite".into();
        cfg.memory.sqlite_path = dir.path().join("nested/sessions.db");
        assert!(QaServiceBuilder::new(cfg).build_session_memory().is_ok());
        assert!(dir.path().join("nested/sessions.db").exists());
    }
}
