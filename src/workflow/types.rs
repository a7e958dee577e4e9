//! 工作流类型定义
//!
//! 状态机阶段、单次 Run 的运行时记录与路由决策。

use serde::{Deserialize, Serialize};

use crate::memory::{ConversationState, Message, ToolCall};

/// 状态机阶段：Planning -> Executing -> {ToolInvoking <-> Executing} -> Critiquing -> Done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    Executing,
    ToolInvoking,
    Critiquing,
    Done,
}

/// Executor 步骤之后的路由结果
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// 最新 Executor 消息携带工具调用
    ToolInvoking(ToolCall),
    /// 无工具调用，进入 Critic
    Critiquing,
}

/// 单次 Run：对话状态 + 计数；Critic 产出最终消息（或致命错误）后销毁
#[derive(Debug, Clone)]
pub struct Run {
    pub state: ConversationState,
    pub phase: RunPhase,
    pub step_count: usize,
    pub tool_call_count: usize,
}

impl Run {
    pub fn new(seed: Vec<Message>) -> Self {
        Self {
            state: ConversationState::seeded(seed),
            phase: RunPhase::Planning,
            step_count: 0,
            tool_call_count: 0,
        }
    }

    /// 追加一个步骤的增量并计数
    pub fn record(&mut self, delta: Message) {
        let state = std::mem::take(&mut self.state);
        self.state = state.append([delta]);
        self.step_count += 1;
    }

    pub fn transition(&mut self, next: RunPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, step = self.step_count, "phase transition");
        self.phase = next;
    }
}

/// 一次 Run 的产出：最终消息与完整对话（供外部持久化）
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub final_message: Message,
    pub state: ConversationState,
    pub step_count: usize,
    pub tool_call_count: usize,
}
