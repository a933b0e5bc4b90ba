//! 分词：关键词检索用
//!
//! 含 CJK 字符时用 jieba 搜索引擎模式切词；否则按非字母数字字符切分并去掉常见英文停用词。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn get_jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

const STOPWORDS: &[&str] = &[
    "the", "is", "are", "was", "were", "an", "of", "to", "in", "on", "for", "and", "or", "it",
    "its", "be", "by", "at", "as", "with", "what", "which", "who", "how", "does", "do", "did",
    "this", "that", "these", "those", "from", "about", "can", "me", "tell",
];

/// 判断字符是否为 CJK（中日韩）字符
fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

fn keep_token(token: &str) -> bool {
    let first = token.chars().next().unwrap_or(' ');
    if is_cjk(first) {
        return true;
    }
    token.chars().count() > 1 && !STOPWORDS.contains(&token)
}

/// 切词并小写化
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if contains_cjk(text) {
        get_jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty() && s.chars().any(char::is_alphanumeric))
            .filter(|s| keep_token(s))
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|s| keep_token(s))
            .collect()
    }
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 查询覆盖率：查询词中出现在文档里的比例（0.0 ~ 1.0）
pub fn coverage_score(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
    if query.is_empty() || doc.is_empty() {
        return 0.0;
    }
    query.intersection(doc).count() as f32 / query.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_english_strips_punctuation_and_stopwords() {
        let tokens = tokenize("What is the main theorem of the paper?");
        assert!(tokens.contains(&"main".to_string()));
        assert!(tokens.contains(&"theorem".to_string()));
        assert!(tokens.contains(&"paper".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.iter().any(|t| t.contains('?')));
    }

    #[test]
    fn test_tokenize_chinese() {
        let tokens = tokenize("我喜欢编程和人工智能");
        assert!(tokens.iter().any(|t| t.contains("编程") || t.contains("智能")));
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_coverage_score() {
        let q = tokenize_to_set("rust ownership rules");
        let d = tokenize_to_set("Ownership in Rust follows three rules.");
        assert!((coverage_score(&q, &d) - 1.0).abs() < 0.001);

        let unrelated = tokenize_to_set("python garbage collector");
        assert_eq!(coverage_score(&q, &unrelated), 0.0);
        assert_eq!(coverage_score(&HashSet::new(), &d), 0.0);
    }
}
