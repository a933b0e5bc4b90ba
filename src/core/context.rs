//! 上下文累积器
//!
//! 按到达顺序保存一次查询收集到的上下文块，并维护去重且有序的来源集合。

use serde::{Deserialize, Serialize};

/// 联网结果的来源标签
pub const WEB_SOURCE: &str = "web";

/// 一段带出处的上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub content: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
}

impl ContextChunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page: None,
            ordinal: None,
        }
    }

    pub fn web(snippet: impl Into<String>) -> Self {
        Self::new(snippet, WEB_SOURCE)
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = Some(ordinal);
        self
    }
}

/// 有序来源集合：保持首次出现顺序，每个标签至多一次
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet(Vec<String>);

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入；已存在时返回 false
    pub fn insert(&mut self, source: &str) -> bool {
        if self.contains(source) {
            return false;
        }
        self.0.push(source.to_string());
        true
    }

    pub fn contains(&self, source: &str) -> bool {
        self.0.iter().any(|s| s == source)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl<'a> FromIterator<&'a str> for SourceSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = SourceSet::new();
        for s in iter {
            set.insert(s);
        }
        set
    }
}

/// 一次查询的上下文与来源，生命周期与 ExecutionState 相同
#[derive(Debug, Clone, Default)]
pub struct ContextAccumulator {
    chunks: Vec<ContextChunk>,
    sources: SourceSet,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加检索结果（保持顺序），并把每个块的来源并入来源集合
    pub fn add_retrieved(&mut self, chunks: Vec<ContextChunk>) {
        for chunk in chunks {
            self.sources.insert(&chunk.source);
            self.chunks.push(chunk);
        }
    }

    /// 追加一条联网结果
    pub fn add_web(&mut self, snippet: impl Into<String>) {
        self.sources.insert(WEB_SOURCE);
        self.chunks.push(ContextChunk::web(snippet));
    }

    /// 丢弃全部已有上下文与来源，只保留一条联网结果（仅 WebFallback 使用）
    pub fn replace_with_web(&mut self, snippet: impl Into<String>) {
        self.chunks.clear();
        self.sources.clear();
        self.add_web(snippet);
    }

    pub fn chunks(&self) -> &[ContextChunk] {
        &self.chunks
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 渲染为给综合模型的编号上下文块：`[n] (source, page p) content`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let origin = match chunk.page {
                Some(page) => format!("{}, page {}", chunk.source, page),
                None => chunk.source.clone(),
            };
            out.push_str(&format!("[{}] ({}) {}\n\n", i + 1, origin, chunk.content.trim()));
        }
        out
    }

    pub fn into_parts(self) -> (Vec<ContextChunk>, SourceSet) {
        (self.chunks, self.sources)
    }
}
