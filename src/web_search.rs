//! 联网搜索协作方
//!
//! 对执行图来说联网搜索永不失败：无结果返回 NO_RESULT，任何错误（网络、HTTP、解析、超时）返回 SEARCH_ERROR，
//! 两者都作为正常的 web 上下文块进入综合。
//! 提供两种后端：配置了 API Key 时用 SearchAPI（Google 引擎，取第一条自然结果摘要），否则用 DuckDuckGo Instant Answer。

use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::Value;

pub const NO_RESULT: &str = "No relevant web search result found.";
pub const SEARCH_ERROR: &str = "Web search error.";

const SEARCHAPI_URL: &str = "https://www.searchapi.io/api/v1/search";
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// 返回一段摘要文本或哨兵字符串
    async fn search(&self, query: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchProvider {
    DuckDuckGo,
    SearchApi { api_key: String },
}

impl SearchProvider {
    /// provider 名 + 可选 key；选了 searchapi 却没有 key 时退回 DuckDuckGo
    pub fn from_config(provider: &str, api_key: Option<&str>) -> Self {
        let key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| std::env::var("SEARCHAPI_API_KEY").ok().filter(|k| !k.is_empty()));
        match (provider.trim().to_lowercase().as_str(), key) {
            ("searchapi", Some(api_key)) => SearchProvider::SearchApi { api_key },
            ("searchapi", None) => {
                tracing::warn!("searchapi selected but no API key configured, using duckduckgo");
                SearchProvider::DuckDuckGo
            }
            _ => SearchProvider::DuckDuckGo,
        }
    }
}

pub struct HttpWebSearch {
    client: Client,
    provider: SearchProvider,
    max_result_chars: usize,
    /// 覆盖提供方的默认 URL（自建代理或测试桩）
    endpoint: Option<String>,
}

impl HttpWebSearch {
    pub fn new(provider: SearchProvider, timeout_secs: u64, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("docqa/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            provider,
            max_result_chars,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn provider(&self) -> &SearchProvider {
        &self.provider
    }

    async fn fetch_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, String> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| format!("Invalid JSON: {}", e))
    }

    async fn query_provider(&self, query: &str) -> Result<Option<String>, String> {
        match &self.provider {
            SearchProvider::SearchApi { api_key } => {
                let body = self
                    .fetch_json(
                        self.endpoint.as_deref().unwrap_or(SEARCHAPI_URL),
                        &[("engine", "google"), ("q", query), ("api_key", api_key)],
                    )
                    .await?;
                Ok(parse_searchapi(&body))
            }
            SearchProvider::DuckDuckGo => {
                let body = self
                    .fetch_json(
                        self.endpoint.as_deref().unwrap_or(DUCKDUCKGO_URL),
                        &[
                            ("q", query),
                            ("format", "json"),
                            ("no_html", "1"),
                            ("skip_disambig", "1"),
                        ],
                    )
                    .await?;
                Ok(parse_duckduckgo(&body))
            }
        }
    }
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(&self, query: &str) -> String {
        match self.query_provider(query).await {
            Ok(Some(snippet)) => {
                let text = truncate_chars(&clean_snippet(&snippet), self.max_result_chars);
                if text.is_empty() {
                    NO_RESULT.to_string()
                } else {
                    text
                }
            }
            Ok(None) => {
                tracing::info!(query, "web search returned no result");
                NO_RESULT.to_string()
            }
            Err(e) => {
                tracing::warn!(error = %e, "web search failed");
                SEARCH_ERROR.to_string()
            }
        }
    }
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// SearchAPI：answer_box.answer 优先，其次第一条 organic_results 的 snippet
pub fn parse_searchapi(body: &Value) -> Option<String> {
    if let Some(answer) = body.pointer("/answer_box/answer").and_then(non_empty_str) {
        return Some(answer);
    }
    body.get("organic_results")?
        .as_array()?
        .iter()
        .find_map(|r| r.get("snippet").and_then(non_empty_str))
}

/// DuckDuckGo Instant Answer：AbstractText 优先，其次第一条相关主题（含分组主题）
pub fn parse_duckduckgo(body: &Value) -> Option<String> {
    if let Some(text) = body.get("AbstractText").and_then(non_empty_str) {
        return Some(text);
    }
    if let Some(answer) = body.get("Answer").and_then(non_empty_str) {
        return Some(answer);
    }
    let topics = body.get("RelatedTopics")?.as_array()?;
    topics.iter().find_map(|t| {
        t.get("Text").and_then(non_empty_str).or_else(|| {
            t.get("Topics")?
                .as_array()?
                .iter()
                .find_map(|sub| sub.get("Text").and_then(non_empty_str))
        })
    })
}

/// 摘要里偶尔带 HTML 标记，转成纯文本
pub fn clean_snippet(snippet: &str) -> String {
    if !snippet.contains('<') {
        return collapse_whitespace(snippet);
    }
    match from_read(snippet.as_bytes(), 200) {
        Ok(text) if !text.trim().is_empty() => collapse_whitespace(&text),
        _ => strip_html_tags(snippet),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    collapse_whitespace(&out)
}

/// 按字符截断，超长时追加省略号
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
