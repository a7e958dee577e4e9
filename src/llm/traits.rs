//! LLM 抽象
//!
//! 两层：LlmClient 是纯文本传输（OpenAI 兼容 / Mock）；CompletionCapability 是角色步骤消费的边界，
//! 输入角色指令 + 历史 + 可用工具，输出一条（可能带工具调用的）Assistant 消息。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolDescriptor;

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("completion timed out after {0}s")]
    Timeout(u64),

    #[error("request failed: {0}")]
    Request(String),

    #[error("empty response")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// 文本补全客户端：messages 已含 system 指令，返回模型原始文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

/// 角色步骤使用的补全能力
#[async_trait]
pub trait CompletionCapability: Send + Sync {
    async fn complete(
        &self,
        role_instruction: &str,
        history: &[Message],
        available_tools: &[ToolDescriptor],
    ) -> Result<Message, LlmError>;
}
