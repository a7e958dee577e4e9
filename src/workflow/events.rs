//! Run 过程事件：供调用方（CLI、SSE 等）展示阶段、工具调用与观察

use serde::Serialize;

use crate::workflow::types::RunPhase;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 进入新阶段
    Phase { phase: RunPhase, step: usize },
    /// Executor 请求工具
    ToolCall {
        tool: String,
        call_id: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { call_id: String, preview: String },
    /// 工具调用失败，已作为内容吸收
    ToolFailure { tool: String, reason: String },
    /// Run 正常结束
    Done { steps: usize, tool_calls: usize },
    /// 致命错误
    Error { text: String },
}
