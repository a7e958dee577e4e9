//! 引擎构建器：从 AppConfig 统一组装 WorkflowEngine
//!
//! CLI 与嵌入方共享同一套工具注册与缓存包装逻辑。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{InMemoryCache, ResultCache};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_client, CompletionCapability, JsonToolProtocol, LlmClient};
use crate::memory::Message;
use crate::tools::{cached, EchoTool, PluginTool, Tool, ToolRegistry};
use crate::workflow::{RolePrompts, WorkflowEngine};

/// 引擎构建器
pub struct EngineBuilder {
    config: AppConfig,
    cache: Arc<dyn ResultCache>,
    extra_tools: Vec<Arc<dyn Tool>>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cache: Arc::new(InMemoryCache::new()),
            extra_tools: Vec::new(),
        }
    }

    /// 替换结果缓存（多个引擎可共享同一缓存）
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// 追加宿主提供的工具；启用缓存时同样按默认 TTL 包装
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 按需包装缓存：全局关闭或 TTL 为 0 时原样注册
    fn wrap(&self, tool: Arc<dyn Tool>, ttl_secs: Option<u64>) -> Arc<dyn Tool> {
        let cache = &self.config.tools.cache;
        let ttl = ttl_secs.unwrap_or(cache.default_ttl_secs);
        if !cache.enabled || ttl == 0 {
            return tool;
        }
        Arc::new(cached(tool, Arc::clone(&self.cache), Duration::from_secs(ttl)))
    }

    /// 构建工具注册表：echo + 配置插件 + 宿主工具；重名即 DuplicateTool
    pub fn build_tool_registry(&self) -> Result<ToolRegistry, AgentError> {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool)?;

        let tool_timeout = Duration::from_secs(self.config.tools.tool_timeout_secs);
        for entry in &self.config.tools.plugins {
            let plugin: Arc<dyn Tool> = Arc::new(PluginTool::new(entry, tool_timeout));
            registry.register_arc(self.wrap(plugin, entry.cache_ttl_secs))?;
        }
        for tool in &self.extra_tools {
            registry.register_arc(self.wrap(Arc::clone(tool), None))?;
        }

        tracing::info!(tools = ?registry.tool_names(), "tool registry built");
        Ok(registry)
    }

    /// 用给定补全能力组装引擎
    pub fn build_with(&self, model: Arc<dyn CompletionCapability>) -> Result<WorkflowEngine, AgentError> {
        let registry = Arc::new(self.build_tool_registry()?);
        let engine = WorkflowEngine::new(model, registry, RolePrompts::from_config(&self.config.prompts))
            .with_completion_timeout(Duration::from_secs(self.config.llm.timeouts.request))
            .with_tool_timeout(Duration::from_secs(self.config.tools.tool_timeout_secs))
            .with_max_tool_iterations(self.config.workflow.max_tool_iterations);
        Ok(engine)
    }

    /// 用文本客户端组装引擎（经 JSON 工具协议适配）
    pub fn build_with_client(&self, llm: Arc<dyn LlmClient>) -> Result<WorkflowEngine, AgentError> {
        self.build_with(Arc::new(JsonToolProtocol::new(llm)))
    }

    /// 按 [llm] 段创建真实客户端并组装引擎
    pub fn build(&self) -> Result<WorkflowEngine, AgentError> {
        let client = create_client(&self.config.llm)?;
        self.build_with_client(Arc::new(client))
    }
}

/// 外部会话记录中的一轮（role 为任意字符串）
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    /// "user" 映射为用户消息，其余一律视为助手消息
    pub fn to_message(&self) -> Message {
        if self.role == "user" {
            Message::user(&self.content)
        } else {
            Message::assistant(&self.content)
        }
    }
}

/// 服务入口：跑完一次 Run，返回最终回答文本
pub async fn process_conversation(
    engine: &WorkflowEngine,
    turns: &[ChatTurn],
) -> Result<String, AgentError> {
    let seed: Vec<Message> = turns.iter().map(ChatTurn::to_message).collect();
    let final_message = engine.run(seed).await?;
    Ok(final_message.content)
}
