//! 核心层：错误分类与引擎构建

pub mod builder;
pub mod error;

pub use builder::{process_conversation, ChatTurn, EngineBuilder};
pub use error::AgentError;
