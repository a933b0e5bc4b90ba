//! DeepSeek / OpenRouter 便捷构造（均为 OpenAI 兼容格式）

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// 创建 DeepSeek 客户端
///
/// - 优先使用环境变量 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
/// - 模型默认 `deepseek-chat`
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model.unwrap_or(DEEPSEEK_CHAT);
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), model, Some(api_key.as_str()))
}

/// 创建 OpenRouter 客户端（`OPENROUTER_API_KEY`）
pub fn create_openrouter_client(model: &str) -> OpenAiClient {
    let api_key = std::env::var("OPENROUTER_API_KEY").ok();
    OpenAiClient::new(Some(OPENROUTER_BASE_URL), model, api_key.as_deref())
}
