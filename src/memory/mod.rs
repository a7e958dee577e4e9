//! 记忆层：单次 Run 的只追加对话状态

pub mod conversation;

pub use conversation::{ConversationState, Message, Role, ToolCall};
