//! 对话状态：单次 Run 内共享的只追加消息序列
//!
//! 每个步骤读取到当前为止的完整状态，只返回要追加的增量；已有消息不可修改或删除。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 消息的结构角色（与角色步骤的身份 Planner/Executor/Critic 分离）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// Assistant 消息上携带的工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    pub call_id: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            call_id: Self::mint_call_id(),
        }
    }

    /// 生成新的 `call_<uuid>` 标识
    pub fn mint_call_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 Assistant 消息可携带；None 表示不请求工具
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// 仅 ToolResult 消息携带：触发它的 call_id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result_of: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
            tool_result_of: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// 携带工具调用的 Assistant 消息
    pub fn assistant_tool_call(content: impl Into<String>, call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// 工具结果消息，引用触发它的 call_id
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_result_of: Some(call_id.into()),
            ..Self::plain(Role::ToolResult, content)
        }
    }

    pub fn requests_tool(&self) -> bool {
        self.role == Role::Assistant && self.tool_call.is_some()
    }
}

/// 只追加的对话状态
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以既有历史作为种子
    pub fn seeded(messages: impl IntoIterator<Item = Message>) -> Self {
        Self::new().append(messages)
    }

    /// 保序拼接：返回追加后的新状态，原有条目不变
    #[must_use]
    pub fn append(mut self, delta: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(delta);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 是否已有 Assistant 消息发出过该 call_id
    pub fn has_tool_call(&self, call_id: &str) -> bool {
        self.messages.iter().any(|m| {
            m.role == Role::Assistant && m.tool_call.as_ref().is_some_and(|c| c.call_id == call_id)
        })
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// 检查工具结果的回指：每条 ToolResult 的 call_id 必须恰好对应一条更早的 Assistant 工具调用，
    /// 且同一 call_id 只被应答一次。
    pub fn verify_tool_links(&self) -> Result<(), String> {
        let mut answered: Vec<&str> = Vec::new();
        for (idx, msg) in self.messages.iter().enumerate() {
            if msg.role != Role::ToolResult {
                continue;
            }
            let call_id = msg
                .tool_result_of
                .as_deref()
                .ok_or_else(|| format!("tool result at #{idx} has no call_id"))?;
            let issuers = self.messages[..idx]
                .iter()
                .filter(|m| {
                    m.role == Role::Assistant
                        && m.tool_call.as_ref().map(|c| c.call_id.as_str()) == Some(call_id)
                })
                .count();
            if issuers != 1 {
                return Err(format!(
                    "tool result at #{idx} references {call_id} issued {issuers} times before it"
                ));
            }
            if answered.contains(&call_id) {
                return Err(format!("call {call_id} answered more than once"));
            }
            answered.push(call_id);
        }
        Ok(())
    }
}
