//! 本地文档索引
//!
//! 分块（按页、带重叠、尽量在分隔符处断开）→ 存储（可选向量 + 关键词集合）→ 检索（RRF 融合）。
//! RagIndex 实现 DocumentRetriever，是执行图 Retrieve 节点的默认检索协作方。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::ContextChunk;
use crate::llm::EmbeddingProvider;
use crate::memory::tokenizer;

/// 检索服务接口：按相关度排序，至多 k 条；没有匹配时返回空列表而不是错误
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>, String>;
}

/// 文档块
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    /// `{source}::p{page}::c{ordinal}`
    pub id: String,
    pub text: String,
    pub source_id: String,
    pub page: Option<u32>,
    /// 页内序号，从 1 开始
    pub ordinal: u32,
}

impl DocumentChunk {
    pub fn to_context(&self) -> ContextChunk {
        let chunk = ContextChunk::new(self.text.clone(), self.source_id.clone())
            .with_ordinal(self.ordinal);
        match self.page {
            Some(page) => chunk.with_page(page),
            None => chunk,
        }
    }
}

/// 分块参数（字符数）
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 断点分隔符，优先级从高到低
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 150,
            separators: ["\n\n", "\n", "。", ". ", "！", "？", "! ", "? ", " "]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 按页切分文档：换页符 `\x0c` 分页；没有换页符时不记录页码
    pub fn chunk_document(&self, doc_id: &str, text: &str) -> Vec<DocumentChunk> {
        let pages: Vec<&str> = text.split('\x0c').collect();
        let paged = pages.len() > 1;
        pages
            .iter()
            .enumerate()
            .flat_map(|(i, page_text)| {
                let page = paged.then_some(i as u32 + 1);
                self.chunk_page(doc_id, page, page_text)
            })
            .collect()
    }

    /// 单页切块（UTF-8 安全）：窗口内最后一个分隔符处断开，相邻块重叠 chunk_overlap 个字符
    pub fn chunk_page(&self, doc_id: &str, page: Option<u32>, text: &str) -> Vec<DocumentChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let size = self.config.chunk_size.max(1);
        let mut out = Vec::new();
        let mut start = 0;

        while start < total {
            let window_end = (start + size).min(total);
            let end = if window_end < total {
                self.break_point(&chars[start..window_end])
                    .map(|offset| start + offset)
                    .unwrap_or(window_end)
            } else {
                window_end
            };

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                let ordinal = out.len() as u32 + 1;
                out.push(DocumentChunk {
                    id: format!("{}::p{}::c{}", doc_id, page.unwrap_or(0), ordinal),
                    text: piece.to_string(),
                    source_id: doc_id.to_string(),
                    page,
                    ordinal,
                });
            }

            if end >= total {
                break;
            }
            let next = end.saturating_sub(self.config.chunk_overlap.min(end - start));
            start = if next > start { next } else { end };
        }
        out
    }

    /// 窗口内最靠后的分隔符结束位置（字符偏移）
    fn break_point(&self, window: &[char]) -> Option<usize> {
        let slice: String = window.iter().collect();
        self.config.separators.iter().find_map(|sep| {
            let pos = slice.rfind(sep.as_str())?;
            let offset = slice[..pos].chars().count() + sep.chars().count();
            (offset > 0).then_some(offset)
        })
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

struct IndexedChunk {
    chunk: DocumentChunk,
    tokens: HashSet<String>,
    embedding: Option<Vec<f32>>,
}

/// 检索命中
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// 内存存储：关键词集合 + 可选向量；超出 max_entries 时丢弃最旧的块
pub struct VectorStore {
    entries: Vec<IndexedChunk>,
    max_entries: usize,
}

const RRF_K: f32 = 60.0;

impl VectorStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    pub fn add(&mut self, chunk: DocumentChunk, embedding: Option<Vec<f32>>) {
        let tokens = tokenizer::tokenize_to_set(&chunk.text);
        self.entries.push(IndexedChunk {
            chunk,
            tokens,
            embedding: embedding.filter(|e| !e.is_empty()),
        });
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
    }

    /// 删除某来源的全部块，返回删除数
    pub fn remove_source(&mut self, source_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.chunk.source_id != source_id);
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.chunk.source_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    /// 混合检索：关键词覆盖率排名与向量相似度排名做 RRF 融合；只有分数 > 0 的块参与排名
    pub fn search(&self, query: &str, query_embedding: Option<&[f32]>, k: usize) -> Vec<ScoredChunk> {
        let query_tokens = tokenizer::tokenize_to_set(query);
        let mut fused: HashMap<usize, f32> = HashMap::new();

        let keyword = self.ranked(|e| tokenizer::coverage_score(&query_tokens, &e.tokens));
        for (rank, idx) in keyword.into_iter().take(k * 2).enumerate() {
            *fused.entry(idx).or_insert(0.0) += 1.0 / (RRF_K + rank as f32);
        }

        if let Some(q) = query_embedding.filter(|q| !q.is_empty()) {
            let vector = self.ranked(|e| {
                e.embedding
                    .as_deref()
                    .map(|emb| cosine_similarity(q, emb))
                    .unwrap_or(0.0)
            });
            for (rank, idx) in vector.into_iter().take(k * 2).enumerate() {
                *fused.entry(idx).or_insert(0.0) += 1.0 / (RRF_K + rank as f32);
            }
        }

        let mut results: Vec<(usize, f32)> = fused.into_iter().collect();
        // 分数相同按插入顺序，保证结果稳定
        results.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        results
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect()
    }

    /// 按打分降序返回条目下标（过滤掉 <= 0 的）
    fn ranked(&self, score: impl Fn(&IndexedChunk) -> f32) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, score(e)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.into_iter().map(|(i, _)| i).collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 本地文档索引：分块器 + 存储 + 可选嵌入
pub struct RagIndex {
    chunker: Chunker,
    store: RwLock<VectorStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl RagIndex {
    pub fn new(max_entries: usize, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            chunker: Chunker::default(),
            store: RwLock::new(VectorStore::new(max_entries)),
            embedder,
        }
    }

    pub fn with_chunking_config(mut self, config: ChunkingConfig) -> Self {
        self.chunker = Chunker::new(config);
        self
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text).await {
            Ok(v) if !v.is_empty() => Some(v),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed, keyword scoring only");
                None
            }
        }
    }

    /// 索引文档（同 doc_id 的旧版本先删除），返回块数
    pub async fn index_document(&self, doc_id: &str, text: &str) -> usize {
        let chunks = self.chunker.chunk_document(doc_id, text);
        self.replace_chunks(doc_id, chunks).await
    }

    /// 按页索引（页码从 1 开始，由调用方给出），同样替换旧版本
    pub async fn index_pages(&self, doc_id: &str, pages: &[(u32, String)]) -> usize {
        let chunks = pages
            .iter()
            .flat_map(|(page, text)| self.chunker.chunk_page(doc_id, Some(*page), text))
            .collect();
        self.replace_chunks(doc_id, chunks).await
    }

    async fn replace_chunks(&self, doc_id: &str, chunks: Vec<DocumentChunk>) -> usize {
        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self.embed(&chunk.text).await;
            embedded.push((chunk, embedding));
        }

        let mut store = self.store.write().await;
        store.remove_source(doc_id);
        let n = embedded.len();
        for (chunk, embedding) in embedded {
            store.add(chunk, embedding);
        }
        tracing::info!(doc_id, chunks = n, "document indexed");
        n
    }

    pub async fn remove_document(&self, doc_id: &str) -> usize {
        self.store.write().await.remove_source(doc_id)
    }

    /// 清空索引，返回删除的块数
    pub async fn clear(&self) -> usize {
        self.store.write().await.clear()
    }

    /// (块数, 文档数)
    pub async fn stats(&self) -> (usize, usize) {
        let store = self.store.read().await;
        (store.len(), store.source_count())
    }

    pub async fn search_scored(&self, query: &str, k: usize) -> Vec<ScoredChunk> {
        let embedding = self.embed(query).await;
        self.store.read().await.search(query, embedding.as_deref(), k)
    }
}

#[async_trait]
impl DocumentRetriever for RagIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>, String> {
        Ok(self
            .search_scored(query, k)
            .await
            .into_iter()
            .map(|hit| hit.chunk.to_context())
            .collect())
    }
}
