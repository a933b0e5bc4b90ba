//! 会话持久化：SQLite
//!
//! 每轮问答一行（session_id, question, answer, sources JSON, created_at），按自增 id 排序。rusqlite 为同步 API，
//! 每次调用在 spawn_blocking 中打开连接执行，避免阻塞 tokio worker。

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::memory::{ConversationTurn, SessionMemory};

/// SQLite 会话存储：读取时只返回最近 max_turns 轮
#[derive(Debug, Clone)]
pub struct SqliteSessionMemory {
    db_path: PathBuf,
    max_turns: usize,
}

impl SqliteSessionMemory {
    /// 打开（必要时创建）数据库文件并建表；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>, max_turns: usize) -> anyhow::Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self { db_path, max_turns };
        store.init_db()?;
        Ok(store)
    }

    fn db(&self) -> anyhow::Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("open session db {}", self.db_path.display()))
    }

    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.db()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns (session_id, id);",
        )?;
        Ok(())
    }

    fn load(&self, session_id: &str) -> anyhow::Result<Vec<ConversationTurn>> {
        let conn = self.db()?;
        let mut stmt = conn.prepare(
            "SELECT question, answer, sources FROM turns
             WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, self.max_turns as i64], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?;
        let mut turns = Vec::new();
        for row in rows {
            let (question, answer, sources) = row?;
            let sources: Vec<String> = match serde_json::from_str(&sources) {
                Ok(sources) => sources,
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "corrupt sources column, treating as empty");
                    Vec::new()
                }
            };
            turns.push(ConversationTurn {
                question,
                answer,
                sources,
            });
        }
        turns.reverse();
        Ok(turns)
    }

    fn insert(&self, session_id: &str, turn: &ConversationTurn) -> anyhow::Result<()> {
        let conn = self.db()?;
        conn.execute(
            "INSERT INTO turns (session_id, question, answer, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                turn.question,
                turn.answer,
                serde_json::to_string(&turn.sources)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, session_id: &str) -> anyhow::Result<usize> {
        let conn = self.db()?;
        Ok(conn.execute("DELETE FROM turns WHERE session_id = ?1", [session_id])?)
    }
}

#[async_trait]
impl SessionMemory for SqliteSessionMemory {
    async fn history(&self, session_id: &str) -> anyhow::Result<Vec<ConversationTurn>> {
        let this = self.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || this.load(&session_id)).await?
    }

    async fn append_turn(&self, session_id: &str, turn: ConversationTurn) -> anyhow::Result<()> {
        let this = self.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || this.insert(&session_id, &turn)).await?
    }

    async fn clear(&self, session_id: &str) -> anyhow::Result<()> {
        let this = self.clone();
        let session_id = session_id.to_string();
        let removed = tokio::task::spawn_blocking(move || this.delete(&session_id)).await??;
        tracing::debug!(removed, "session turns cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_roundtrip_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let mem = SqliteSessionMemory::open(dir.path().join("sessions.db"), 10).unwrap();

        mem.append_turn("s1", ConversationTurn::new("q1", "a1", vec!["doc1".into(), "web".into()]))
            .await
            .unwrap();
        mem.append_turn("s1", ConversationTurn::new("q2", "a2", vec![]))
            .await
            .unwrap();
        mem.append_turn("s2", ConversationTurn::new("other", "x", vec![]))
            .await
            .unwrap();

        let history = mem.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q1");
        assert_eq!(history[0].sources, vec!["doc1".to_string(), "web".to_string()]);
        assert_eq!(history[1].answer, "a2");
    }

    #[tokio::test]
    async fn test_sqlite_limits_to_recent_turns() {
        let dir = tempfile::tempdir().unwrap();
        let mem = SqliteSessionMemory::open(dir.path().join("nested/sessions.db"), 2).unwrap();
        for i in 0..5 {
            mem.append_turn("s", ConversationTurn::new(format!("q{i}"), "a", vec![]))
                .await
                .unwrap();
        }
        let history = mem.history("s").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "q3");
        assert_eq!(history[1].question, "q4");
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_sources_still_loads_turn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let mem = SqliteSessionMemory::open(&path, 10).unwrap();
        Connection::open(&path)
            .unwrap()
            .execute(
                "INSERT INTO turns (session_id, question, answer, sources, created_at)
                 VALUES ('s', 'q', 'a', 'not json', '2024-01-01T00:00:00Z')",
                [],
            )
            .unwrap();

        let history = mem.history("s").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].answer, "a");
        assert!(history[0].sources.is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_clear_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        {
            let mem = SqliteSessionMemory::open(&path, 10).unwrap();
            mem.append_turn("keep", ConversationTurn::new("q", "a", vec![]))
                .await
                .unwrap();
            mem.append_turn("drop", ConversationTurn::new("q", "a", vec![]))
                .await
                .unwrap();
            mem.clear("drop").await.unwrap();
        }
        let reopened = SqliteSessionMemory::open(&path, 10).unwrap();
        assert_eq!(reopened.history("keep").await.unwrap().len(), 1);
        assert!(reopened.history("drop").await.unwrap().is_empty());
    }
}
