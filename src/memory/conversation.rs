//! 对话消息与问答轮次
//!
//! Message 是发给 LLM 的单条消息；ConversationTurn 是会话日志中的一轮问答（问题、答案、来源），
//! 由 SessionMemory 存取，对编排核心只读。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一轮问答：写入会话日志，供下一次规划与综合作为历史
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            sources,
        }
    }

    /// 展开为 user + assistant 两条消息，便于直接拼进对话上下文
    pub fn to_messages(&self) -> [Message; 2] {
        [
            Message::user(self.question.clone()),
            Message::assistant(self.answer.clone()),
        ]
    }
}

/// 取最近 n 轮（保持原有顺序）
pub fn recent_turns(history: &[ConversationTurn], n: usize) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(n)..]
}

/// 将最近 n 轮格式化为 prompt 片段（Q/A 交替）；无历史时返回空串
pub fn format_history(history: &[ConversationTurn], n: usize) -> String {
    let mut s = String::new();
    for turn in recent_turns(history, n) {
        s.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (1..=n)
            .map(|i| ConversationTurn::new(format!("q{i}"), format!("a{i}"), vec![]))
            .collect()
    }

    #[test]
    fn test_recent_turns_keeps_tail() {
        let history = turns(5);
        let recent = recent_turns(&history, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "q4");
        assert_eq!(recent[1].question, "q5");
    }

    #[test]
    fn test_recent_turns_shorter_than_window() {
        let history = turns(1);
        assert_eq!(recent_turns(&history, 3).len(), 1);
        assert!(recent_turns(&[], 3).is_empty());
    }

    #[test]
    fn test_format_history() {
        let history = turns(3);
        let s = format_history(&history, 2);
        assert!(!s.contains("q1"));
        assert!(s.contains("Q: q2\nA: a2\n"));
        assert!(s.ends_with("Q: q3\nA: a3\n"));
    }

    #[test]
    fn test_turn_deserialize_without_sources() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"question": "q", "answer": "a"}"#).unwrap();
        assert!(turn.sources.is_empty());
    }
}
