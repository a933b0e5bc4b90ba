//! 执行图：Planner → (Retrieve | SearchWeb)* → Reader → [WebFallback → Reader] → End
//!
//! 驱动循环独占 ExecutionState。每个决策点按优先级路由：
//! 1. 需要回退且尚未回退过 → WebFallback
//! 2. 上一次检索为空 → SearchWeb（强制绕行，不消费计划）
//! 3. 弹出下一个计划步骤；计划耗尽 → Reader
//!
//! Reader 之后只有 WebFallback 或 End，排在回答步骤之后的动作直接丢弃。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;

use crate::agents::{PlanGenerator, Reader, RetrieverAgent};
use crate::core::action::{plan_with_web_step, Action, Plan};
use crate::core::error::QaError;
use crate::core::fallback::FallbackController;
use crate::core::state::{ExecutionState, GraphNode};
use crate::memory::ConversationTurn;
use crate::web_search::{WebSearch, SEARCH_ERROR};

/// 一次查询的结果
#[derive(Debug, Clone, Serialize)]
pub struct GraphOutcome {
    pub answer: String,
    pub sources: Vec<String>,
    /// 规划器生成的计划；发生过回退时在首个回答步骤前补上 SEARCH_WEB
    pub plan: Plan,
    /// 实际经过的节点序列
    pub path: Vec<GraphNode>,
    pub fallback_used: bool,
}

/// 路由：返回下一个节点，以及（若从计划中弹出了步骤）该步骤
pub fn next_node(state: &mut ExecutionState, current: GraphNode) -> (GraphNode, Option<Action>) {
    if state.needs_web_fallback && !state.fallback_used() {
        state.mark_fallback_used();
        state.needs_web_fallback = false;
        return (GraphNode::WebFallback, None);
    }

    match current {
        GraphNode::Reader | GraphNode::End => {
            if !state.remaining_plan.is_empty() {
                tracing::debug!(
                    discarded = ?state.remaining_plan,
                    "ignoring plan steps queued after the answering step"
                );
                state.remaining_plan.clear();
            }
            (GraphNode::End, None)
        }
        GraphNode::WebFallback => (GraphNode::Reader, None),
        GraphNode::Planner | GraphNode::Retrieve | GraphNode::SearchWeb => {
            if state.retrieval_was_empty {
                return (GraphNode::SearchWeb, None);
            }
            match state.pop_action() {
                Some(action) => {
                    let node = match &action {
                        Action::Retrieve { .. } => GraphNode::Retrieve,
                        Action::SearchWeb => GraphNode::SearchWeb,
                        Action::Answer | Action::AskClarify { .. } => GraphNode::Reader,
                    };
                    (node, Some(action))
                }
                None => (GraphNode::Reader, None),
            }
        }
    }
}

pub struct ExecutionGraph {
    planner: PlanGenerator,
    retriever: RetrieverAgent,
    web: Arc<dyn WebSearch>,
    reader: Reader,
    fallback: FallbackController,
    web_timeout: Duration,
}

impl ExecutionGraph {
    pub fn new(
        planner: PlanGenerator,
        retriever: RetrieverAgent,
        web: Arc<dyn WebSearch>,
        reader: Reader,
    ) -> Self {
        Self {
            planner,
            retriever,
            web,
            reader,
            fallback: FallbackController::default(),
            web_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackController) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_web_timeout(mut self, web_timeout: Duration) -> Self {
        self.web_timeout = web_timeout;
        self
    }

    /// 执行一次查询
    pub async fn run(
        &self,
        session_id: &str,
        question: &str,
        history: Vec<ConversationTurn>,
    ) -> Result<GraphOutcome, QaError> {
        let mut state = ExecutionState::new(session_id, question, history);
        let mut path = vec![GraphNode::Planner];

        let plan = self
            .planner
            .plan(&state.question, &state.history, Utc::now())
            .await;
        let max_steps = plan.len() * 2 + 4;
        state.set_plan(plan);
        tracing::info!(session_id, node = %GraphNode::Planner, step = 0, plan = ?state.plan, "transition");

        let mut current = GraphNode::Planner;
        let mut steps = 0;
        loop {
            let (next, action) = next_node(&mut state, current);
            if next == GraphNode::End {
                break;
            }
            steps += 1;
            if steps > max_steps {
                tracing::warn!(session_id, steps, "step ceiling exceeded, ending with current answer");
                break;
            }
            tracing::info!(session_id, node = %next, step = steps, "transition");
            path.push(next);

            match next {
                GraphNode::Retrieve => {
                    let k = match action {
                        Some(Action::Retrieve { k }) => k,
                        _ => self.planner.limits().default_k,
                    };
                    self.handle_retrieve(&mut state, k).await;
                }
                GraphNode::SearchWeb => self.handle_search_web(&mut state).await,
                GraphNode::Reader => {
                    if let Some(Action::AskClarify { question }) = action {
                        state.clarify_hint = Some(question);
                    }
                    self.handle_reader(&mut state).await?;
                }
                GraphNode::WebFallback => self.handle_web_fallback(&mut state).await,
                GraphNode::Planner | GraphNode::End => {}
            }
            current = next;
        }

        path.push(GraphNode::End);
        tracing::info!(session_id, node = %GraphNode::End, step = steps + 1, path = ?path, "transition");

        let fallback_used = state.fallback_used();
        let plan = if fallback_used {
            plan_with_web_step(&state.plan)
        } else {
            state.plan.clone()
        };
        let (_, sources) = state.context.into_parts();
        Ok(GraphOutcome {
            answer: state.answer,
            sources: sources.into_vec(),
            plan,
            path,
            fallback_used,
        })
    }

    async fn handle_retrieve(&self, state: &mut ExecutionState, k: usize) {
        let chunks = self.retriever.retrieve(&state.question, &state.history, k).await;
        if chunks.is_empty() {
            tracing::info!(session_id = %state.session_id, "retrieval empty, detouring to web search");
            state.retrieval_was_empty = true;
        } else {
            tracing::debug!(count = chunks.len(), "retrieved");
            state.context.add_retrieved(chunks);
            state.retrieval_was_empty = false;
        }
    }

    async fn web_snippet(&self, question: &str) -> String {
        match timeout(self.web_timeout, self.web.search(question)).await {
            Ok(snippet) => snippet,
            Err(_) => {
                tracing::warn!(secs = self.web_timeout.as_secs(), "web search timed out");
                SEARCH_ERROR.to_string()
            }
        }
    }

    async fn handle_search_web(&self, state: &mut ExecutionState) {
        let snippet = self.web_snippet(&state.question).await;
        state.context.add_web(snippet);
        state.retrieval_was_empty = false;
    }

    async fn handle_reader(&self, state: &mut ExecutionState) -> Result<(), QaError> {
        let answer = self
            .reader
            .synthesize(
                &state.question,
                &state.context,
                &state.history,
                state.clarify_hint.as_deref(),
            )
            .await?;
        state.needs_web_fallback = self
            .fallback
            .needs_web_fallback(&answer, state.context.sources());
        if state.needs_web_fallback {
            tracing::info!(session_id = %state.session_id, "answer looks uninformative");
        }
        state.answer = answer;
        Ok(())
    }

    async fn handle_web_fallback(&self, state: &mut ExecutionState) {
        let snippet = self.web_snippet(&state.question).await;
        state.context.replace_with_web(snippet);
        state.needs_web_fallback = false;
        state.retrieval_was_empty = false;
    }
}
