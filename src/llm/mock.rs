//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序吐出预置回复；预置回复用完后：structured 请求返回默认计划 JSON，
//! 普通请求回显最后一条 User 消息的首行。每次调用的消息都会被记录，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// 预置回复：成功文本或失败
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<Vec<Message>>>,
    /// 设置后忽略预置回复，每次调用都以该消息失败
    fail_all: Option<String>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定文本
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for r in replies {
            client.push(MockReply::Text(r.into()));
        }
        client
    }

    /// 每次调用都失败
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_all: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: MockReply) {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(reply);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 所有调用的消息快照
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], structured: bool) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        if let Some(message) = &self.fail_all {
            return Err(LlmError::Request(message.clone()));
        }

        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(e)) => Err(LlmError::Request(e)),
            None if structured => {
                Ok(r#"[{"action": "RETRIEVE", "args": {"k": 5}}, {"action": "ANSWER"}]"#.to_string())
            }
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .and_then(|m| m.content.lines().next())
                    .unwrap_or("(no input)");
                Ok(format!("Mock answer: {last_user}"))
            }
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
