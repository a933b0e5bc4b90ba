//! 回退判定：综合答案是否像「模型承认缺少信息」
//!
//! 纯函数、确定性、幂等：答案小写后包含任一短语，且来源中还没有 web，才建议一次联网回退。
//! 短语表只是启发式，误判可接受；可通过配置覆盖。

use crate::core::context::{SourceSet, WEB_SOURCE};

/// 默认的「信息不足」短语
pub const DEFAULT_INSUFFICIENCY_PHRASES: &[&str] = &[
    "cannot",
    "don't have",
    "does not contain",
    "sorry",
    "unable to",
    "no information",
    "not provided",
];

#[derive(Debug, Clone)]
pub struct FallbackController {
    phrases: Vec<String>,
}

impl FallbackController {
    /// 自定义短语表；短语统一转小写，空表回落到默认短语
    pub fn new(phrases: &[String]) -> Self {
        let phrases: Vec<String> = phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        if phrases.is_empty() {
            return Self::default();
        }
        Self { phrases }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// 是否需要联网回退
    pub fn needs_web_fallback(&self, answer: &str, sources: &SourceSet) -> bool {
        if sources.contains(WEB_SOURCE) {
            return false;
        }
        let lower = answer.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }
}

impl Default for FallbackController {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_INSUFFICIENCY_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}
