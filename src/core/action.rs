//! 计划动作模型
//!
//! Action 是封闭的四种步骤；Plan 是按序消费的 Action 列表。
//! 规划服务的输出不可信：只有经过 `Action::from_value` 校验的条目才能进入计划。

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

/// 计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "args", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// 从本地文档索引取 k 条
    Retrieve { k: usize },
    /// 联网搜索
    SearchWeb,
    /// 基于已累积上下文综合答案
    Answer,
    /// 问题含糊时向用户澄清（仍会进入综合）
    AskClarify { question: String },
}

/// 一次查询的计划
pub type Plan = Vec<Action>;

/// Retrieve.k 的默认值与上限
#[derive(Debug, Clone, Copy)]
pub struct RetrieveLimits {
    pub default_k: usize,
    pub max_k: usize,
}

impl Default for RetrieveLimits {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 20,
        }
    }
}

impl Action {
    /// 线上格式中的动作标签
    pub fn tag(&self) -> &'static str {
        match self {
            Action::Retrieve { .. } => "RETRIEVE",
            Action::SearchWeb => "SEARCH_WEB",
            Action::Answer => "ANSWER",
            Action::AskClarify { .. } => "ASK_CLARIFY",
        }
    }

    /// 是否为进入综合（Reader）的步骤
    pub fn is_answering(&self) -> bool {
        matches!(self, Action::Answer | Action::AskClarify { .. })
    }

    /// 从 JSON 对象解析；非对象或标签无法识别时返回 None
    ///
    /// 参数既可放在 `args` 中，也可平铺在顶层（`{"action": "RETRIEVE", "k": 3}`）。
    pub fn from_value(value: &Value, limits: RetrieveLimits) -> Option<Action> {
        let obj = value.as_object()?;
        let tag = obj.get("action")?.as_str()?;
        let args = obj.get("args").and_then(Value::as_object);
        let arg = |name: &str| args.and_then(|a| a.get(name)).or_else(|| obj.get(name));

        match normalize_tag(tag).as_str() {
            "RETRIEVE" => {
                let k = arg("k")
                    .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
                    .map(|k| k as usize)
                    .unwrap_or(limits.default_k)
                    .clamp(1, limits.max_k.max(1));
                Some(Action::Retrieve { k })
            }
            "SEARCH_WEB" | "SEARCHWEB" | "WEB_SEARCH" => Some(Action::SearchWeb),
            "ANSWER" => Some(Action::Answer),
            "ASK_CLARIFY" | "ASKCLARIFY" | "CLARIFY" => {
                let question = arg("question")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                Some(Action::AskClarify { question })
            }
            _ => None,
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_uppercase() })
        .collect()
}

/// 规划失败或结果为空时使用的默认计划：先检索再回答
pub fn default_plan(k: usize) -> Plan {
    vec![Action::Retrieve { k }, Action::Answer]
}

/// 发生过联网回退时对外返回的计划：在首个回答步骤前补一个 SearchWeb（已有则原样返回）
pub fn plan_with_web_step(plan: &[Action]) -> Plan {
    let mut plan = plan.to_vec();
    if plan.contains(&Action::SearchWeb) {
        return plan;
    }
    let pos = plan
        .iter()
        .position(Action::is_answering)
        .unwrap_or(plan.len());
    plan.insert(pos, Action::SearchWeb);
    plan
}

/// Plan step format (schema injected into the planner prompt).
#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanStepFormat {
    /// Which action to take.
    action: ActionKind,
    /// Arguments: RETRIEVE takes {"k": n}; ASK_CLARIFY takes {"question": "..."}; others omit args.
    args: Option<PlanStepArgs>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ActionKind {
    Retrieve,
    SearchWeb,
    Answer,
    AskClarify,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct PlanStepArgs {
    /// Number of local document chunks to retrieve.
    k: Option<u32>,
    /// Clarifying question for the user.
    question: Option<String>,
}

/// 单个计划步骤的 JSON Schema，可拼入规划 prompt
pub fn plan_step_schema_json() -> String {
    let schema = schema_for!(PlanStepFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Option<Action> {
        Action::from_value(&v, RetrieveLimits::default())
    }

    #[test]
    fn test_parse_all_tags() {
        assert_eq!(
            parse(json!({"action": "RETRIEVE", "args": {"k": 3}})),
            Some(Action::Retrieve { k: 3 })
        );
        assert_eq!(parse(json!({"action": "SEARCH_WEB"})), Some(Action::SearchWeb));
        assert_eq!(parse(json!({"action": "ANSWER"})), Some(Action::Answer));
        assert_eq!(
            parse(json!({"action": "ASK_CLARIFY", "args": {"question": "Which paper?"}})),
            Some(Action::AskClarify {
                question: "Which paper?".into()
            })
        );
    }

    #[test]
    fn test_parse_tag_spellings() {
        assert_eq!(parse(json!({"action": "search_web"})), Some(Action::SearchWeb));
        assert_eq!(parse(json!({"action": "Search-Web"})), Some(Action::SearchWeb));
        assert_eq!(parse(json!({"action": " answer "})), Some(Action::Answer));
    }

    #[test]
    fn test_parse_rejects_unknown_and_non_objects() {
        assert_eq!(parse(json!({"action": "DELETE_ALL"})), None);
        assert_eq!(parse(json!({"args": {"k": 5}})), None);
        assert_eq!(parse(json!({"action": 7})), None);
        assert_eq!(parse(json!("ANSWER")), None);
        assert_eq!(parse(json!(42)), None);
    }

    #[test]
    fn test_retrieve_k_defaults_and_clamps() {
        assert_eq!(parse(json!({"action": "RETRIEVE"})), Some(Action::Retrieve { k: 5 }));
        assert_eq!(
            parse(json!({"action": "RETRIEVE", "args": {"k": "abc"}})),
            Some(Action::Retrieve { k: 5 })
        );
        assert_eq!(
            parse(json!({"action": "RETRIEVE", "k": "7"})),
            Some(Action::Retrieve { k: 7 })
        );
        assert_eq!(
            parse(json!({"action": "RETRIEVE", "args": {"k": 0}})),
            Some(Action::Retrieve { k: 1 })
        );
        assert_eq!(
            parse(json!({"action": "RETRIEVE", "args": {"k": 500}})),
            Some(Action::Retrieve { k: 20 })
        );
    }

    #[test]
    fn test_serialize_wire_format() {
        let plan = vec![
            Action::Retrieve { k: 5 },
            Action::SearchWeb,
            Action::AskClarify {
                question: "q?".into(),
            },
            Action::Answer,
        ];
        let v = serde_json::to_value(&plan).unwrap();
        assert_eq!(
            v,
            json!([
                {"action": "RETRIEVE", "args": {"k": 5}},
                {"action": "SEARCH_WEB"},
                {"action": "ASK_CLARIFY", "args": {"question": "q?"}},
                {"action": "ANSWER"}
            ])
        );
    }

    #[test]
    fn test_plan_with_web_step() {
        let plan = default_plan(5);
        assert_eq!(
            plan_with_web_step(&plan),
            vec![Action::Retrieve { k: 5 }, Action::SearchWeb, Action::Answer]
        );

        let already = vec![Action::SearchWeb, Action::Answer];
        assert_eq!(plan_with_web_step(&already), already);

        let no_answer = vec![Action::Retrieve { k: 2 }];
        assert_eq!(
            plan_with_web_step(&no_answer),
            vec![Action::Retrieve { k: 2 }, Action::SearchWeb]
        );
    }

    #[test]
    fn test_schema_mentions_actions() {
        let schema = plan_step_schema_json();
        assert!(schema.contains("SEARCH_WEB"));
        assert!(schema.contains("ASK_CLARIFY"));
    }
}
