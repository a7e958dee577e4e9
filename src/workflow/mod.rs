//! 多角色工作流：Planner -> Executor -> {Tool -> Executor}* -> Critic
//!
//! - **types**: 阶段、Run 记录、路由结果
//! - **roles**: 三个角色步骤及其指令
//! - **tool_step**: 工具调用步骤（错误吸收为内容）
//! - **router**: Executor 之后的条件路由
//! - **engine**: 状态机驱动、取消与迭代上限
//! - **events**: 过程事件

pub mod engine;
pub mod events;
pub mod roles;
pub mod router;
pub mod tool_step;
pub mod types;

pub use engine::{RunOptions, WorkflowEngine};
pub use events::RunEvent;
pub use roles::{AgentRole, RolePrompts, RoleStep};
pub use router::route_after_executor;
pub use tool_step::{invoke_tool, ToolStepOutput};
pub use types::{Route, Run, RunOutcome, RunPhase};
