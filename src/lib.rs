//! AgentFlow - 多角色编排引擎
//!
//! 模块划分：
//! - **cache**: 工具结果缓存（TTL、惰性过期、规范化键）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、引擎构建器
//! - **llm**: 补全能力抽象、JSON 工具协议、OpenAI 兼容客户端 / Mock
//! - **memory**: 只追加的对话状态
//! - **tools**: 工具注册表、缓存装饰器、执行器、内置工具
//! - **workflow**: Planner -> Executor -> {Tool -> Executor}* -> Critic 状态机

pub mod cache;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod workflow;

pub use crate::core::{process_conversation, AgentError, ChatTurn, EngineBuilder};
pub use crate::workflow::{RunOptions, WorkflowEngine};
