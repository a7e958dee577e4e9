//! 文本工具调用协议：把任意 LlmClient 适配为 CompletionCapability
//!
//! 请求：system = 角色指令 (+ 可用工具与调用格式)；历史中的工具调用渲染为 JSON，工具结果渲染为 Observation。
//! 回复：纯文本为最终内容；JSON `{"tool": "...", "args": {...}}`（裸对象、```json 块或数组）为工具调用。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::llm::{CompletionCapability, LlmClient, LlmError};
use crate::memory::{Message, Role, ToolCall};
use crate::tools::{tool_call_schema_json, ToolDescriptor};

/// LLM 返回的工具调用（文本协议格式）
///
/// 模型给出的 id 一律忽略，call_id 总是本地生成，保证一次 Run 内唯一。
#[derive(Debug, Clone, Deserialize)]
struct RawToolCall {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// 解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    /// 直接回复
    Response(String),
    /// 工具调用；dropped 为被忽略的多余调用数
    ToolCall { call: ToolCall, dropped: usize },
}

/// 解析 LLM 原始输出
///
/// - 空输出 -> EmptyResponse
/// - JSON（裸对象、```json 块或正文中的片段）带 `tool` 键才算调用尝试；格式不对 -> Malformed
/// - 其余 JSON（普通数据、示例配置）与散文一样按普通回复处理
pub fn parse_llm_output(output: &str) -> Result<ParsedOutput, LlmError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    for candidate in call_candidates(trimmed) {
        if let Some(parsed) = parse_calls(candidate).map_err(LlmError::Malformed)? {
            return Ok(parsed);
        }
    }

    Ok(ParsedOutput::Response(trimmed.to_string()))
}

/// 可能承载工具调用的 JSON 片段：```json 块、整段 JSON、正文中首尾花括号之间
fn call_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        candidates.push(rest.find("```").map(|end| &rest[..end]).unwrap_or(rest).trim());
    }
    if text.starts_with('{') || text.starts_with('[') {
        candidates.push(text);
    } else if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            candidates.push(&text[start..=end]);
        }
    }
    candidates
}

/// 对象带 `tool` 键（或数组首元素如此）
fn is_call_attempt(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("tool"),
        Value::Array(items) => items.first().is_some_and(is_call_attempt),
        _ => false,
    }
}

/// 不是 JSON 或不是调用尝试 -> Ok(None)
fn parse_calls(json_str: &str) -> Result<Option<ParsedOutput>, String> {
    let Ok(value) = serde_json::from_str::<Value>(json_str) else {
        return Ok(None);
    };
    if !is_call_attempt(&value) {
        return Ok(None);
    }
    let mut calls = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    let dropped = calls.len() - 1;
    let raw: RawToolCall =
        serde_json::from_value(calls.swap_remove(0)).map_err(|e| format!("{e}: {json_str}"))?;
    if raw.tool.trim().is_empty() {
        return Err(format!("tool name is empty: {json_str}"));
    }
    let arguments = match raw.args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(format!("args must be an object, got {other}")),
    };
    Ok(Some(ParsedOutput::ToolCall {
        call: ToolCall::new(raw.tool.trim(), arguments),
        dropped,
    }))
}

/// 将工具调用渲染回文本协议格式（不带 id，免得模型照抄）
fn render_call(call: &ToolCall) -> String {
    serde_json::json!({ "tool": call.name, "args": call.arguments }).to_string()
}

/// 文本协议适配器
pub struct JsonToolProtocol {
    llm: Arc<dyn LlmClient>,
}

impl JsonToolProtocol {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn system_prompt(instruction: &str, tools: &[ToolDescriptor]) -> String {
        if tools.is_empty() {
            return instruction.to_string();
        }
        let listing = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
        format!(
            "{instruction}\n\n## Available tools\n{listing}\n\n## Tool call format\n\
             To call a tool, respond with ONLY one JSON object matching this schema and nothing else:\n{}\n\
             Example: {{\"tool\": \"{}\", \"args\": {{...}}}}\n\
             Call at most one tool per reply. When you can answer without a tool, reply with plain text.",
            tool_call_schema_json(),
            tools[0].name,
        )
    }

    /// 把对话历史转成纯文本消息（ToolResult 作为 user 侧的 Observation）
    fn render_history(history: &[Message]) -> Vec<Message> {
        history
            .iter()
            .map(|m| match m.role {
                Role::Assistant => match &m.tool_call {
                    Some(call) if m.content.trim().is_empty() => Message::assistant(render_call(call)),
                    Some(call) => Message::assistant(format!("{}\n{}", m.content, render_call(call))),
                    None => Message::assistant(m.content.clone()),
                },
                Role::ToolResult => Message::user(format!(
                    "Observation for {}: {}",
                    m.tool_result_of.as_deref().unwrap_or("unknown call"),
                    m.content
                )),
                Role::User => Message::user(m.content.clone()),
                Role::System => Message::system(m.content.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl CompletionCapability for JsonToolProtocol {
    async fn complete(
        &self,
        role_instruction: &str,
        history: &[Message],
        available_tools: &[ToolDescriptor],
    ) -> Result<Message, LlmError> {
        let mut messages = vec![Message::system(Self::system_prompt(
            role_instruction,
            available_tools,
        ))];
        messages.extend(Self::render_history(history));

        let output = self.llm.complete(&messages).await?;
        // 没有可用工具（Planner / Critic）时回复只是内容，不做调用解析
        if available_tools.is_empty() {
            let text = output.trim();
            if text.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            return Ok(Message::assistant(text));
        }
        match parse_llm_output(&output)? {
            ParsedOutput::Response(text) => Ok(Message::assistant(text)),
            ParsedOutput::ToolCall { call, dropped } => {
                if dropped > 0 {
                    tracing::warn!(
                        tool = %call.name,
                        dropped,
                        "reply carried several tool calls; only the first is honored"
                    );
                }
                Ok(Message::assistant_tool_call("", call))
            }
        }
    }
}
