//! 运行错误分类
//!
//! 基础设施级错误（模型服务不可用、注册表配置错误、不终止）抛给 run 的调用方；
//! 工具级错误（未注册、执行失败、超时）由 Tool 步骤吸收为 tool-result 内容，Run 继续。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug)]
pub enum AgentError {
    /// 补全服务不可达或返回不可用的输出；对 Run 致命
    #[error("Model service error: {0}")]
    ModelService(#[from] LlmError),

    /// 请求的工具未注册；可恢复
    #[error("Tool '{0}' not found.")]
    ToolNotFound(String),

    /// 已注册工具执行失败；可恢复
    #[error("Tool '{tool}' failed: {reason}")]
    ToolInvocation { tool: String, reason: String },

    /// 工具调用超时；可恢复
    #[error("Tool '{0}' timed out")]
    ToolTimeout(String),

    /// 仅在构建注册表时出现
    #[error("Duplicate tool registration: {0}")]
    DuplicateTool(String),

    /// 工具调用循环超出上限仍未进入 Critic
    #[error("Run did not terminate within {limit} tool calls")]
    RunNotTerminating { limit: usize },

    #[error("Seed conversation is empty")]
    EmptyConversation,

    #[error("Run cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 是否为工具级（可被吸收为对话内容）的错误
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound(_)
                | AgentError::ToolInvocation { .. }
                | AgentError::ToolTimeout(_)
        )
    }
}
