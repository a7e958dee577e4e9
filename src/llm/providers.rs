//! 服务商选择：Groq / DeepSeek / OpenAI 均提供 OpenAI 兼容接口
//!
//! - Groq: https://api.groq.com/openai/v1，密钥 `GROQ_API_KEY`
//! - DeepSeek: https://api.deepseek.com，密钥 `DEEPSEEK_API_KEY`
//! - OpenAI: 默认端点，密钥 `OPENAI_API_KEY`
//!
//! `[llm].base_url` 可覆盖任一服务商的端点。

use crate::config::LlmSection;
use crate::core::AgentError;
use crate::llm::OpenAiClient;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 服务商对应的 (默认端点, API Key 环境变量)
fn provider_defaults(provider: &str) -> Result<(Option<&'static str>, &'static str), AgentError> {
    match provider.to_ascii_lowercase().as_str() {
        "groq" => Ok((Some(GROQ_BASE_URL), "GROQ_API_KEY")),
        "deepseek" => Ok((Some(DEEPSEEK_BASE_URL), "DEEPSEEK_API_KEY")),
        "openai" => Ok((None, "OPENAI_API_KEY")),
        other => Err(AgentError::ConfigError(format!("unknown llm provider: {other}"))),
    }
}

/// 按 [llm] 段创建客户端；缺少 API Key 视为配置错误
pub fn create_client(section: &LlmSection) -> Result<OpenAiClient, AgentError> {
    let (default_base, key_var) = provider_defaults(&section.provider)?;
    let api_key = std::env::var(key_var)
        .map_err(|_| AgentError::ConfigError(format!("{key_var} is not set")))?;
    let base_url = section.base_url.as_deref().or(default_base);
    tracing::info!(
        provider = %section.provider,
        model = %section.model,
        base_url = base_url.unwrap_or("default"),
        "llm client configured"
    );
    Ok(OpenAiClient::new(base_url, &section.model, &api_key).with_temperature(section.temperature))
}
