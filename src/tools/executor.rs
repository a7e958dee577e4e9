//! 工具执行器
//!
//! 持有只读 ToolRegistry 与单次调用超时：按名解析工具，在超时内执行，
//! 未注册 / 失败 / 超时分别映射为 ToolNotFound / ToolInvocation / ToolTimeout；
//! 每次调用输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::ToolRegistry;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 以新的超时重建执行器，共享同一注册表
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self::new(Arc::clone(&self.registry), timeout)
    }

    /// 执行一次工具调用
    pub async fn execute(&self, call: &ToolCall) -> Result<Value, AgentError> {
        let Some(tool) = self.registry.resolve(&call.name) else {
            audit(&call.name, &call.call_id, false, "not_found", 0, "");
            return Err(AgentError::ToolNotFound(call.name.clone()));
        };

        let args = Value::Object(call.arguments.clone());
        let preview = args_preview(&args);
        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(args)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        audit(&call.name, &call.call_id, ok, outcome, duration_ms, &preview);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(AgentError::ToolInvocation {
                tool: call.name.clone(),
                reason,
            }),
            Err(_) => Err(AgentError::ToolTimeout(call.name.clone())),
        }
    }
}

fn audit(tool: &str, call_id: &str, ok: bool, outcome: &str, duration_ms: u64, args_preview: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "call_id": call_id,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview,
    });
    tracing::info!(audit = %audit, "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{EchoTool, Tool};
    use async_trait::async_trait;
    use serde_json::{json, Map};

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        registry.register(Slow).unwrap();
        ToolExecutor::new(Arc::new(registry), Duration::from_millis(50))
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new(name, args.as_object().cloned().unwrap_or_else(Map::new))
    }

    #[tokio::test]
    async fn test_execute_ok() {
        let out = executor().execute(&call("echo", json!({"text": "hi"}))).await.unwrap();
        assert_eq!(out, json!("hi"));
    }

    #[tokio::test]
    async fn test_execute_maps_errors() {
        let ex = executor();
        assert!(matches!(
            ex.execute(&call("stock_price", json!({}))).await,
            Err(AgentError::ToolNotFound(ref n)) if n == "stock_price"
        ));
        assert!(matches!(
            ex.execute(&call("echo", json!({}))).await,
            Err(AgentError::ToolInvocation { .. })
        ));
        assert!(matches!(
            ex.execute(&call("slow", json!({}))).await,
            Err(AgentError::ToolTimeout(_))
        ));
    }
}
