//! 会话记忆：按 session_id 存取问答轮次
//!
//! 编排核心只通过 SessionMemory 读取历史、追加轮次、清空会话。
//! 读取与追加之间没有事务：同一会话的并发请求可能交错读写，这是有意保留的弱一致性边界。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::memory::ConversationTurn;

/// 会话记忆接口
#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// 按时间顺序返回会话历史（最旧在前）
    async fn history(&self, session_id: &str) -> anyhow::Result<Vec<ConversationTurn>>;

    /// 追加一轮问答
    async fn append_turn(&self, session_id: &str, turn: ConversationTurn) -> anyhow::Result<()>;

    /// 清空会话
    async fn clear(&self, session_id: &str) -> anyhow::Result<()>;
}

/// 内存实现：进程内 HashMap，每个会话最多保留 max_turns 轮（超出丢弃最旧的）
#[derive(Clone)]
pub struct InMemorySessionMemory {
    sessions: Arc<RwLock<HashMap<String, Vec<ConversationTurn>>>>,
    max_turns: usize,
}

impl InMemorySessionMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_turns,
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionMemory {
    fn default() -> Self {
        Self::new(50)
    }
}

#[async_trait]
impl SessionMemory for InMemorySessionMemory {
    async fn history(&self, session_id: &str) -> anyhow::Result<Vec<ConversationTurn>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_turn(&self, session_id: &str, turn: ConversationTurn) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push(turn);
        if turns.len() > self.max_turns {
            let excess = turns.len() - self.max_turns;
            turns.drain(..excess);
        }
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_history_in_order() {
        let mem = InMemorySessionMemory::new(10);
        mem.append_turn("s1", ConversationTurn::new("q1", "a1", vec!["doc".into()]))
            .await
            .unwrap();
        mem.append_turn("s1", ConversationTurn::new("q2", "a2", vec![]))
            .await
            .unwrap();

        let history = mem.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q1");
        assert_eq!(history[0].sources, vec!["doc".to_string()]);
        assert_eq!(history[1].question, "q2");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let mem = InMemorySessionMemory::default();
        mem.append_turn("a", ConversationTurn::new("q", "a", vec![]))
            .await
            .unwrap();
        assert!(mem.history("b").await.unwrap().is_empty());
        assert_eq!(mem.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_max_turns_prunes_oldest() {
        let mem = InMemorySessionMemory::new(2);
        for i in 0..4 {
            mem.append_turn("s", ConversationTurn::new(format!("q{i}"), "a", vec![]))
                .await
                .unwrap();
        }
        let history = mem.history("s").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q2");
    }

    #[tokio::test]
    async fn test_clear() {
        let mem = InMemorySessionMemory::default();
        mem.append_turn("s", ConversationTurn::new("q", "a", vec![]))
            .await
            .unwrap();
        mem.clear("s").await.unwrap();
        assert!(mem.history("s").await.unwrap().is_empty());
        // 清空不存在的会话不报错
        mem.clear("missing").await.unwrap();
    }
}
