//! 工具调用 JSON Schema 生成（schemars）
//!
//! 拼入 Executor 的 system 指令，约束 LLM 输出合法的 `{"tool": "...", "args": {...}}`。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 文本协议中的工具调用格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 已注册的工具名，如 get_weather、web_search
    pub tool: String,
    /// 工具参数对象，键与工具的参数 schema 一致
    pub args: Map<String, Value>,
}

/// 返回工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
