//! 角色步骤：Planner / Executor / Critic
//!
//! 每个步骤是 (状态, 固定角色指令) -> 一条新消息：把指令放在完整历史之前，调用一次补全能力，
//! 结果包装为 Assistant 消息。补全失败或超时即 ModelService 错误，本层不重试。

use std::fmt;
use std::time::Duration;

use crate::config::PromptsSection;
use crate::core::AgentError;
use crate::llm::{CompletionCapability, LlmError};
use crate::memory::{ConversationState, Message, Role};
use crate::tools::ToolDescriptor;

/// 角色步骤的身份（与消息的结构角色分离）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Planner,
    Executor,
    Critic,
}

impl AgentRole {
    /// 只有 Executor 可以请求工具
    pub fn may_call_tools(self) -> bool {
        matches!(self, AgentRole::Executor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Executor => "executor",
            AgentRole::Critic => "critic",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 三个角色的指令文本
#[derive(Debug, Clone)]
pub struct RolePrompts {
    pub planner: String,
    pub executor: String,
    pub critic: String,
}

impl RolePrompts {
    pub fn new(
        planner: impl Into<String>,
        executor: impl Into<String>,
        critic: impl Into<String>,
    ) -> Self {
        Self {
            planner: planner.into(),
            executor: executor.into(),
            critic: critic.into(),
        }
    }

    /// 从 [prompts] 段解析（配置 > 文件 > 内置默认）
    pub fn from_config(section: &PromptsSection) -> Self {
        Self::new(
            section.resolve(AgentRole::Planner.as_str()),
            section.resolve(AgentRole::Executor.as_str()),
            section.resolve(AgentRole::Critic.as_str()),
        )
    }
}

/// 单个角色步骤：角色身份 + 不透明的指令文本
#[derive(Debug, Clone)]
pub struct RoleStep {
    role: AgentRole,
    instruction: String,
}

impl RoleStep {
    pub fn new(role: AgentRole, instruction: impl Into<String>) -> Self {
        Self {
            role,
            instruction: instruction.into(),
        }
    }

    pub fn planner(instruction: impl Into<String>) -> Self {
        Self::new(AgentRole::Planner, instruction)
    }

    pub fn executor(instruction: impl Into<String>) -> Self {
        Self::new(AgentRole::Executor, instruction)
    }

    pub fn critic(instruction: impl Into<String>) -> Self {
        Self::new(AgentRole::Critic, instruction)
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// 执行一次补全，返回要追加的那一条消息
    ///
    /// Planner / Critic 看不到任何工具描述；若补全服务仍附带工具调用，结构上剥离并告警。
    pub async fn run(
        &self,
        model: &dyn CompletionCapability,
        state: &ConversationState,
        tools: &[ToolDescriptor],
        timeout: Duration,
    ) -> Result<Message, AgentError> {
        if state.is_empty() {
            return Err(AgentError::EmptyConversation);
        }
        let tools: &[ToolDescriptor] = if self.role.may_call_tools() { tools } else { &[] };

        let reply = tokio::time::timeout(
            timeout,
            model.complete(&self.instruction, state.messages(), tools),
        )
        .await
        .map_err(|_| LlmError::Timeout(timeout.as_secs()))??;

        let mut message = Message {
            role: Role::Assistant,
            tool_result_of: None,
            ..reply
        };
        if !self.role.may_call_tools() {
            if let Some(call) = message.tool_call.take() {
                tracing::warn!(role = %self.role, tool = %call.name, "dropping tool call from non-executor role");
            }
        }
        tracing::debug!(
            role = %self.role,
            tool_call = message.tool_call.as_ref().map(|c| c.name.as_str()).unwrap_or("-"),
            "role step complete"
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCall;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::Mutex;

    /// 固定返回带工具调用的回复，并记录收到的工具数
    struct AlwaysCalls {
        seen_tools: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CompletionCapability for AlwaysCalls {
        async fn complete(
            &self,
            _instruction: &str,
            _history: &[Message],
            tools: &[ToolDescriptor],
        ) -> Result<Message, LlmError> {
            self.seen_tools.lock().unwrap().push(tools.len());
            Ok(Message::assistant_tool_call(
                "calling",
                ToolCall::new("get_weather", Map::new()),
            ))
        }
    }

    struct Hangs;

    #[async_trait]
    impl CompletionCapability for Hangs {
        async fn complete(
            &self,
            _instruction: &str,
            _history: &[Message],
            _tools: &[ToolDescriptor],
        ) -> Result<Message, LlmError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Message::assistant("too late"))
        }
    }

    fn tools() -> Vec<ToolDescriptor> {
        vec![ToolDescriptor {
            name: "get_weather".into(),
            description: "weather".into(),
            parameters: json!({}),
        }]
    }

    fn seeded() -> ConversationState {
        ConversationState::seeded([Message::user("weather in Delhi?")])
    }

    #[tokio::test]
    async fn test_planner_and_critic_cannot_call_tools() {
        let model = AlwaysCalls { seen_tools: Mutex::new(Vec::new()) };
        for step in [RoleStep::planner("plan"), RoleStep::critic("review")] {
            let msg = step.run(&model, &seeded(), &tools(), Duration::from_secs(1)).await.unwrap();
            assert_eq!(msg.role, Role::Assistant);
            assert!(msg.tool_call.is_none());
            assert_eq!(msg.content, "calling");
        }
        assert_eq!(*model.seen_tools.lock().unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_executor_keeps_tool_call() {
        let model = AlwaysCalls { seen_tools: Mutex::new(Vec::new()) };
        let msg = RoleStep::executor("act")
            .run(&model, &seeded(), &tools(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(msg.tool_call.map(|c| c.name), Some("get_weather".to_string()));
        assert_eq!(*model.seen_tools.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_timeout_is_model_service_error() {
        let err = RoleStep::planner("plan")
            .run(&Hangs, &seeded(), &[], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ModelService(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_empty_state_rejected() {
        let err = RoleStep::planner("plan")
            .run(&Hangs, &ConversationState::new(), &[], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyConversation));
    }
}
