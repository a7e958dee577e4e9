//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AGENTFLOW__*` 覆盖（双下划线表示嵌套，如 `AGENTFLOW__LLM__PROVIDER=deepseek`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub workflow: WorkflowSection,
    pub tools: ToolsSection,
    pub prompts: PromptsSection,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：groq / deepseek / openai
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_model() -> String {
    "openai/gpt-oss-120b".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求超时（秒），超时对 Run 致命
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [workflow] 段：状态机参数
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    /// 工具调用循环上限，超出即 RunNotTerminating
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

fn default_max_tool_iterations() -> usize {
    8
}

/// [tools] 段：工具超时、结果缓存、插件
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），超时转为错误 tool-result
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            cache: CacheSection::default(),
            plugins: Vec::new(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.cache] 段
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// 未单独配置 TTL 的工具使用的默认 TTL（秒）
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    3600
}

/// [[tools.plugins]]：外部程序作为工具
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    pub description: String,
    pub program: String,
    /// 参数模板，{{key}} 由调用参数替换
    #[serde(default)]
    pub args: Vec<String>,
    /// 必填参数名（生成参数 schema）
    #[serde(default)]
    pub params: Vec<String>,
    /// 单独的缓存 TTL；0 表示不缓存
    pub cache_ttl_secs: Option<u64>,
}

/// [prompts] 段：三个角色的指令（对引擎而言是不透明字符串）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub planner: Option<String>,
    pub executor: Option<String>,
    pub critic: Option<String>,
}

const DEFAULT_PLANNER_PROMPT: &str = "You are a planning agent. Look at the user's goal and outline a short, clear plan (2-5 bullet points) for how an AI should answer.\nDo NOT give the final answer, only the plan.";

const DEFAULT_EXECUTOR_PROMPT: &str = "You are an execution agent. You are given the full conversation so far and a plan from another agent (in one of the last assistant messages).\nProduce a helpful, detailed answer that follows the plan, calling a tool when you need fresh external information. Do NOT include the word 'plan' in your answer.";

const DEFAULT_CRITIC_PROMPT: &str = "You are a critic and editor agent. Review the latest assistant answer; if it is satisfactory return it as it is, otherwise:\n- fix any obvious issues\n- improve clarity and structure\n- keep the same meaning and tone\nRespond with the final improved answer.";

impl PromptsSection {
    /// 解析顺序：配置字符串 > config/prompts/<role>.txt > 内置默认
    pub fn resolve(&self, role: &str) -> String {
        let configured = match role {
            "planner" => self.planner.clone(),
            "executor" => self.executor.clone(),
            "critic" => self.critic.clone(),
            _ => None,
        };
        configured
            .or_else(|| {
                [
                    format!("config/prompts/{role}.txt"),
                    format!("../config/prompts/{role}.txt"),
                ]
                .into_iter()
                .find_map(|p| std::fs::read_to_string(p).ok())
            })
            .unwrap_or_else(|| match role {
                "planner" => DEFAULT_PLANNER_PROMPT.to_string(),
                "executor" => DEFAULT_EXECUTOR_PROMPT.to_string(),
                _ => DEFAULT_CRITIC_PROMPT.to_string(),
            })
    }
}

/// 从 config 目录加载配置，环境变量 AGENTFLOW__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AGENTFLOW__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AGENTFLOW")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
