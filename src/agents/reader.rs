//! 综合（Reader）：基于累积上下文与会话历史生成最终答案
//!
//! 这是唯一会把错误上抛给调用方的环节：调用失败映射为 QaError::Synthesis，超时为 QaError::Timeout。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::core::{ContextAccumulator, QaError};
use crate::llm::LlmClient;
use crate::memory::{recent_turns, ConversationTurn, Message};

/// 内置综合 prompt；可被 config/prompts/reader.txt 覆盖
pub const DEFAULT_READER_PROMPT: &str = "You answer user questions using the numbered context passages provided with each question.
Answer clearly and cite supporting evidence by passage number, e.g. [1] or [2][3].
If the context does not contain the information needed, say so plainly instead of guessing.";

pub struct Reader {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
    history_turns: usize,
    call_timeout: Duration,
}

impl Reader {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            prompt_template: DEFAULT_READER_PROMPT.to_string(),
            history_turns: 5,
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    pub fn with_history_turns(mut self, n: usize) -> Self {
        self.history_turns = n;
        self
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// system 指令 → 历史轮次（user/assistant 交替）→ 本轮问题与上下文
    pub fn build_messages(
        &self,
        question: &str,
        context: &ContextAccumulator,
        history: &[ConversationTurn],
        clarify_hint: Option<&str>,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(self.prompt_template.clone())];
        for turn in recent_turns(history, self.history_turns) {
            messages.extend(turn.to_messages());
        }

        let rendered = if context.is_empty() {
            "(no context available)\n".to_string()
        } else {
            context.render()
        };
        let mut user = format!("User Question: {}\n\nRelevant Information:\n{}", question, rendered);
        if let Some(hint) = clarify_hint {
            user.push_str(&format!(
                "\nIf the information above is not enough to answer, ask the user this clarifying question instead: {}\n",
                hint
            ));
        }
        messages.push(Message::user(user));
        messages
    }

    pub async fn synthesize(
        &self,
        question: &str,
        context: &ContextAccumulator,
        history: &[ConversationTurn],
        clarify_hint: Option<&str>,
    ) -> Result<String, QaError> {
        let messages = self.build_messages(question, context, history, clarify_hint);
        tracing::debug!(chunks = context.len(), messages = messages.len(), "synthesizing");

        match timeout(self.call_timeout, self.llm.complete(&messages, false)).await {
            Ok(result) => Ok(result?.trim().to_string()),
            Err(_) => Err(QaError::Timeout {
                stage: "synthesis",
                secs: self.call_timeout.as_secs(),
            }),
        }
    }
}
