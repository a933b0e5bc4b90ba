//! 执行状态与图节点
//!
//! ExecutionState 由执行图的驱动循环独占持有，按 `&mut` 传给各节点处理函数；
//! 查询开始时创建、结束时销毁，不跨查询或会话共享。

use std::collections::VecDeque;
use std::fmt;

use serde::Serialize;

use crate::core::action::{Action, Plan};
use crate::core::context::ContextAccumulator;
use crate::memory::ConversationTurn;

/// 执行图中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNode {
    Planner,
    Retrieve,
    SearchWeb,
    Reader,
    WebFallback,
    End,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GraphNode::Planner => "planner",
            GraphNode::Retrieve => "retrieve",
            GraphNode::SearchWeb => "search_web",
            GraphNode::Reader => "reader",
            GraphNode::WebFallback => "web_fallback",
            GraphNode::End => "end",
        };
        f.write_str(name)
    }
}

/// 单次查询的可变状态
#[derive(Debug)]
pub struct ExecutionState {
    pub question: String,
    pub session_id: String,
    /// 会话历史（只读快照）
    pub history: Vec<ConversationTurn>,
    /// 规划器产出的原始计划（对外返回用）
    pub plan: Plan,
    /// 尚未消费的步骤，只会缩短
    pub remaining_plan: VecDeque<Action>,
    pub context: ContextAccumulator,
    pub answer: String,
    /// 进入 Reader 时若由 AskClarify 触发，携带澄清问题
    pub clarify_hint: Option<String>,
    pub retrieval_was_empty: bool,
    pub needs_web_fallback: bool,
    /// 单调：一旦为 true 不再回到 false
    fallback_used: bool,
}

impl ExecutionState {
    pub fn new(
        session_id: impl Into<String>,
        question: impl Into<String>,
        history: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
            history,
            plan: Vec::new(),
            remaining_plan: VecDeque::new(),
            context: ContextAccumulator::new(),
            answer: String::new(),
            clarify_hint: None,
            retrieval_was_empty: false,
            needs_web_fallback: false,
            fallback_used: false,
        }
    }

    /// 装载计划；remaining_plan 从完整计划开始
    pub fn set_plan(&mut self, plan: Plan) {
        self.remaining_plan = plan.iter().cloned().collect();
        self.plan = plan;
    }

    /// 弹出下一个步骤
    pub fn pop_action(&mut self) -> Option<Action> {
        self.remaining_plan.pop_front()
    }

    pub fn fallback_used(&self) -> bool {
        self.fallback_used
    }

    /// 标记回退已使用；第二次调用返回 false
    pub fn mark_fallback_used(&mut self) -> bool {
        if self.fallback_used {
            return false;
        }
        self.fallback_used = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_is_consumed_left_to_right() {
        let mut state = ExecutionState::new("s", "q", vec![]);
        state.set_plan(vec![Action::Retrieve { k: 2 }, Action::Answer]);

        assert_eq!(state.pop_action(), Some(Action::Retrieve { k: 2 }));
        assert_eq!(state.remaining_plan.len(), 1);
        assert_eq!(state.pop_action(), Some(Action::Answer));
        assert_eq!(state.pop_action(), None);
        // 原始计划不受消费影响
        assert_eq!(state.plan.len(), 2);
    }

    #[test]
    fn test_fallback_used_is_monotonic() {
        let mut state = ExecutionState::new("s", "q", vec![]);
        assert!(!state.fallback_used());
        assert!(state.mark_fallback_used());
        assert!(!state.mark_fallback_used());
        assert!(state.fallback_used());
    }

    #[test]
    fn test_node_display() {
        assert_eq!(GraphNode::WebFallback.to_string(), "web_fallback");
        assert_eq!(
            serde_json::to_string(&GraphNode::SearchWeb).unwrap(),
            "\"search_web\""
        );
    }
}
