//! Tool 步骤：兑现最新 Executor 消息上的工具调用，追加恰好一条 tool-result 消息
//!
//! 未注册、执行失败、超时都不会中止 Run：错误文本成为 tool-result 内容，由 Executor 决定后备方案。
//! 缓存由注册时包装的 CachedTool 负责，这里不感知。

use serde_json::Value;

use crate::core::AgentError;
use crate::memory::{Message, ToolCall};
use crate::tools::ToolExecutor;

/// Tool 步骤的产出
#[derive(Debug)]
pub struct ToolStepOutput {
    /// 要追加的 tool-result 消息（引用原 call_id）
    pub message: Message,
    /// 被吸收的工具级错误；成功时为 None
    pub failure: Option<AgentError>,
}

/// 把工具结果渲染为消息文本：字符串原样，其余为紧凑 JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_failure(err: &AgentError) -> String {
    match err {
        AgentError::ToolNotFound(_) => {
            format!("{err} It is unavailable; answer without it or use another tool.")
        }
        other => format!("Error: {other}"),
    }
}

pub async fn invoke_tool(executor: &ToolExecutor, call: &ToolCall) -> ToolStepOutput {
    match executor.execute(call).await {
        Ok(value) => ToolStepOutput {
            message: Message::tool_result(&call.call_id, render_value(&value)),
            failure: None,
        },
        Err(err) => {
            tracing::warn!(tool = %call.name, call_id = %call.call_id, error = %err, "tool call absorbed as error result");
            ToolStepOutput {
                message: Message::tool_result(&call.call_id, render_failure(&err)),
                failure: Some(err),
            }
        }
    }
}
