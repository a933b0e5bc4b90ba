//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `DOCQA__*` 覆盖（双下划线表示嵌套，如 `DOCQA__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::fallback::DEFAULT_INSUFFICIENCY_PHRASES;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub retrieval: RetrievalSection,
    pub web_search: WebSearchSection,
    pub memory: MemorySection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 提供给规划器与综合的历史轮数
    pub max_history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_history_turns: 5,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai / openrouter / mock；对应的 API Key 缺失时退回 mock
    pub provider: String,
    pub model: String,
    /// 规划器单独使用的模型（未设置时与 model 相同）
    pub planner_model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            planner_model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// HTTP 请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [retrieval] 段：检索参数与本地索引
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub default_k: usize,
    pub max_k: usize,
    /// 拼进检索查询的历史问题轮数
    pub history_turns_for_query: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_entries: usize,
    pub embeddings_enabled: bool,
    pub embedding_model: String,
    pub embedding_base_url: Option<String>,
    /// 启动时自动导入的文档目录
    pub docs_dir: Option<PathBuf>,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 20,
            history_turns_for_query: 2,
            chunk_size: 1000,
            chunk_overlap: 150,
            max_entries: 50_000,
            embeddings_enabled: false,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_base_url: None,
            docs_dir: None,
        }
    }
}

/// [web_search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSearchSection {
    /// duckduckgo / searchapi
    pub provider: String,
    /// 未设置时读取环境变量 SEARCHAPI_API_KEY
    pub searchapi_api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for WebSearchSection {
    fn default() -> Self {
        Self {
            provider: "duckduckgo".to_string(),
            searchapi_api_key: None,
            timeout_secs: 15,
            max_result_chars: 2000,
        }
    }
}

/// [memory] 段：会话历史存储
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// memory / sqlite
    pub backend: String,
    pub sqlite_path: PathBuf,
    /// 每个会话保留的最近轮数
    pub max_turns: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            sqlite_path: PathBuf::from("data/sessions.db"),
            max_turns: 50,
        }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 每次协作方调用（规划、检索、联网、综合）的超时
    pub call_timeout_secs: u64,
    pub insufficiency_phrases: Vec<String>,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            call_timeout_secs: 60,
            insufficiency_phrases: DEFAULT_INSUFFICIENCY_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 DOCQA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 DOCQA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("DOCQA")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 读取 prompt 覆盖文件（config/prompts/<name>.txt），不存在时返回 None
pub fn load_prompt_override(name: &str) -> Option<String> {
    [
        format!("config/prompts/{}.txt", name),
        format!("../config/prompts/{}.txt", name),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .filter(|s| !s.trim().is_empty())
}
