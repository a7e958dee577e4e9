//! LLM 层：传输客户端（OpenAI 兼容 / Mock）与面向角色步骤的补全能力

pub mod mock;
pub mod openai;
pub mod protocol;
pub mod providers;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use protocol::{parse_llm_output, JsonToolProtocol, ParsedOutput};
pub use providers::create_client;
pub use traits::{CompletionCapability, LlmClient, LlmError};
