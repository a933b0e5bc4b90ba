//! 计划生成器：问题 + 历史 + 当前时间 → 计划
//!
//! 调用推理服务得到 JSON 动作数组，再经 normalize_plan 清洗。
//! 任何失败（调用失败、超时、解析失败、结果为空）都回落到默认计划，不向调用方报错。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::action::{default_plan, plan_step_schema_json, Action, Plan, RetrieveLimits};
use crate::llm::LlmClient;
use crate::memory::{format_history, ConversationTurn, Message};

/// 内置规划 prompt；可被 config/prompts/planner.txt 覆盖
pub const DEFAULT_PLANNER_PROMPT: &str = r#"You are the planning component of a question-answering system over a local document collection with optional live web search.

Available actions:
- RETRIEVE {"k": n}: fetch the n most relevant chunks from the local documents.
- SEARCH_WEB: run a live web search for the question.
- ANSWER: compose the final answer from everything gathered so far.
- ASK_CLARIFY {"question": "..."}: the question is too ambiguous to answer; provide the clarifying question to ask the user.

Policy:
- Prefer answering from the local documents: RETRIEVE first (default k = {default_k}).
- Use SEARCH_WEB when, in your judgment, the question is time-sensitive or needs information the documents are unlikely to contain. Do not rely on keyword triggers.
- Use ASK_CLARIFY only when the question is genuinely ambiguous.
- Every plan must end with ANSWER (or ASK_CLARIFY).

Each plan step must match this JSON Schema:
{schema}

Respond with a JSON array of steps and nothing else.
Example: [{"action": "RETRIEVE", "args": {"k": {default_k}}}, {"action": "ANSWER"}]

Current time: {now}
Recent conversation:
{history}
Question: {question}
"#;

fn code_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"))
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(schema|default_k|now|history|question)\}").expect("valid regex"))
}

/// 单趟替换模板占位符；替换进来的内容（历史、问题）不会再被当作占位符展开
fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    placeholder()
        .replace_all(template, |caps: &regex::Captures| {
            let key = &caps[1];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// 从模型原始输出中取出 JSON：整体解析 → 去掉代码围栏 → 截取最外层 [...] / {...}
fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let body = code_fence()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        return Some(v);
    }

    let span = |open: char, close: char| {
        let start = body.find(open)?;
        let end = body.rfind(close)?;
        (end > start).then(|| &body[start..=end])
    };
    let mut candidates = [span('[', ']'), span('{', '}')];
    // 先出现的括号类型优先
    candidates.sort_by_key(|c| c.map(|s| s.as_ptr() as usize).unwrap_or(usize::MAX));
    candidates
        .into_iter()
        .flatten()
        .find_map(|s| serde_json::from_str::<Value>(s).ok())
}

/// 清洗已解析的 JSON：单对象包成列表；字符串元素再解析一次；无法识别的元素丢弃
pub fn normalize_value(value: Value, limits: RetrieveLimits) -> Plan {
    let items = match value {
        Value::Array(items) => items,
        other @ (Value::Object(_) | Value::String(_)) => vec![other],
        _ => Vec::new(),
    };

    let plan: Plan = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => serde_json::from_str::<Value>(s.trim())
                .ok()
                .and_then(|v| Action::from_value(&v, limits)),
            other => Action::from_value(&other, limits),
        })
        .collect();

    if plan.is_empty() {
        default_plan(limits.default_k)
    } else {
        plan
    }
}

/// 清洗模型原始输出；保证返回非空、只含已识别动作的计划
pub fn normalize_plan(raw: &str, limits: RetrieveLimits) -> Plan {
    match extract_json(raw) {
        Some(value) => normalize_value(value, limits),
        None => {
            tracing::warn!(raw = %preview(raw), "planner output is not JSON, using default plan");
            default_plan(limits.default_k)
        }
    }
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}

/// 计划生成器
pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
    limits: RetrieveLimits,
    history_turns: usize,
    call_timeout: Duration,
}

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, limits: RetrieveLimits) -> Self {
        Self {
            llm,
            prompt_template: DEFAULT_PLANNER_PROMPT.to_string(),
            limits,
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

    pub fn limits(&self) -> RetrieveLimits {
        self.limits
    }

    fn build_prompt(&self, question: &str, history: &[ConversationTurn], now: DateTime<Utc>) -> String {
        let history = format_history(history, self.history_turns);
        let schema = plan_step_schema_json();
        let default_k = self.limits.default_k.to_string();
        let now = now.to_rfc3339();
        render_template(
            &self.prompt_template,
            &[
                ("schema", schema.as_str()),
                ("default_k", default_k.as_str()),
                ("now", now.as_str()),
                ("history", if history.is_empty() { "(none)\n" } else { history.as_str() }),
                ("question", question),
            ],
        )
    }

    /// 生成计划；永不失败
    pub async fn plan(
        &self,
        question: &str,
        history: &[ConversationTurn],
        now: DateTime<Utc>,
    ) -> Plan {
        let prompt = self.build_prompt(question, history, now);
        tracing::debug!(model = self.llm.model_name(), prompt_len = prompt.len(), "planning");
        let messages = vec![Message::user(prompt)];

        match timeout(self.call_timeout, self.llm.complete(&messages, true)).await {
            Ok(Ok(raw)) => {
                let plan = normalize_plan(&raw, self.limits);
                tracing::info!(plan = ?plan, "plan generated");
                plan
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "planner call failed, using default plan");
                default_plan(self.limits.default_k)
            }
            Err(_) => {
                tracing::warn!(
                    secs = self.call_timeout.as_secs(),
                    "planner call timed out, using default plan"
                );
                default_plan(self.limits.default_k)
            }
        }
    }
}
