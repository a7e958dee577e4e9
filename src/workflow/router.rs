//! 路由：仅在 Executor 步骤之后求值
//!
//! 最新追加的 Assistant 消息带工具调用 -> ToolInvoking，否则 -> Critiquing。
//! 每轮 Executor 至多兑现一个工具调用（消息类型只容纳一个，多余调用在协议层已丢弃并告警）。

use crate::memory::{Message, Role};
use crate::workflow::types::Route;

pub fn route_after_executor(latest: &Message) -> Route {
    match (&latest.role, &latest.tool_call) {
        (Role::Assistant, Some(call)) => Route::ToolInvoking(call.clone()),
        _ => Route::Critiquing,
    }
}
