//! 检索代理：用最近几轮的问题补全当前查询，再调用检索服务
//!
//! 检索错误与超时只记录日志并按「无结果」处理，由执行图转去联网搜索。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::ContextChunk;
use crate::memory::{recent_turns, ConversationTurn, DocumentRetriever};

/// 将最近 n 轮的问题拼在当前问题前面，帮助检索解析「它」「这篇论文」之类的指代
pub fn augment_query(question: &str, history: &[ConversationTurn], n: usize) -> String {
    let mut parts: Vec<&str> = recent_turns(history, n)
        .iter()
        .map(|t| t.question.trim())
        .filter(|q| !q.is_empty())
        .collect();
    parts.push(question.trim());
    parts.join("\n")
}

pub struct RetrieverAgent {
    retriever: Arc<dyn DocumentRetriever>,
    history_turns: usize,
    call_timeout: Duration,
}

impl RetrieverAgent {
    pub fn new(retriever: Arc<dyn DocumentRetriever>) -> Self {
        Self {
            retriever,
            history_turns: 2,
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_history_turns(mut self, n: usize) -> Self {
        self.history_turns = n;
        self
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// 检索至多 k 条上下文；失败返回空列表
    pub async fn retrieve(
        &self,
        question: &str,
        history: &[ConversationTurn],
        k: usize,
    ) -> Vec<ContextChunk> {
        let query = augment_query(question, history, self.history_turns);
        tracing::debug!(query = %query, k, "retrieving");

        match timeout(self.call_timeout, self.retriever.search(&query, k)).await {
            Ok(Ok(mut chunks)) => {
                chunks.truncate(k);
                chunks
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "retrieval failed, treating as empty");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(secs = self.call_timeout.as_secs(), "retrieval timed out, treating as empty");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingRetriever {
        result: Result<Vec<ContextChunk>, String>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl DocumentRetriever for RecordingRetriever {
        async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>, String> {
            self.queries.lock().unwrap().push((query.to_string(), k));
            self.result.clone()
        }
    }

    fn turn(q: &str) -> ConversationTurn {
        ConversationTurn::new(q, "answer", vec![])
    }

    #[test]
    fn test_augment_query_uses_last_turns() {
        let history = vec![turn("first"), turn("who wrote the paper?"), turn("when?")];
        assert_eq!(
            augment_query("what did she prove?", &history, 2),
            "who wrote the paper?\nwhen?\nwhat did she prove?"
        );
        assert_eq!(augment_query("q", &[], 2), "q");
        assert_eq!(augment_query("q", &history, 0), "q");
    }

    #[tokio::test]
    async fn test_retrieve_truncates_to_k() {
        let chunks = (0..5)
            .map(|i| ContextChunk::new(format!("c{i}"), format!("s{i}")))
            .collect();
        let inner = Arc::new(RecordingRetriever {
            result: Ok(chunks),
            queries: Mutex::new(vec![]),
        });
        let agent = RetrieverAgent::new(inner.clone());
        let got = agent.retrieve("q", &[turn("prev")], 3).await;
        assert_eq!(got.len(), 3);
        assert_eq!(inner.queries.lock().unwrap()[0], ("prev\nq".to_string(), 3));
    }

    #[tokio::test]
    async fn test_retrieve_error_is_empty() {
        let agent = RetrieverAgent::new(Arc::new(RecordingRetriever {
            result: Err("index offline".into()),
            queries: Mutex::new(vec![]),
        }));
        assert!(agent.retrieve("q", &[], 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_timeout_is_empty() {
        struct Stuck;

        #[async_trait]
        impl DocumentRetriever for Stuck {
            async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ContextChunk>, String> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(vec![ContextChunk::new("late", "doc")])
            }
        }

        let agent = RetrieverAgent::new(Arc::new(Stuck)).with_timeout(Duration::from_millis(20));
        assert!(agent.retrieve("q", &[], 5).await.is_empty());
    }
}
