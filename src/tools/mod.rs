//! 工具层：注册表、缓存装饰器、执行器与内置工具

pub mod cached;
pub mod echo;
pub mod executor;
pub mod plugin;
pub mod registry;
pub mod schema;

pub use cached::{cached, CachedTool};
pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use plugin::PluginTool;
pub use registry::{Tool, ToolDescriptor, ToolRegistry};
pub use schema::tool_call_schema_json;
