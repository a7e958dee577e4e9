//! 插件工具：由配置 [[tools.plugins]] 注册，运行「程序 + 参数模板」接入外部查询
//!
//! 参数模板中 {{key}} 从 LLM 传入的 args 中取值；不经 shell，直接 exec program + 替换后的参数。
//! stdout 若为合法 JSON 则按 JSON 返回，否则作为字符串返回；非零退出码视为工具失败。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::process::Command;

use crate::config::PluginEntry;
use crate::tools::Tool;

pub struct PluginTool {
    name: String,
    description: String,
    program: String,
    args_template: Vec<String>,
    params: Vec<String>,
    timeout: Duration,
}

impl PluginTool {
    pub fn new(entry: &PluginEntry, timeout: Duration) -> Self {
        Self {
            name: entry.name.clone(),
            description: entry.description.clone(),
            program: entry.program.clone(),
            args_template: entry.args.clone(),
            params: entry.params.clone(),
            timeout,
        }
    }

    /// 单遍替换 {{key}}：替换进来的值不会再被展开；未知占位符原样保留
    fn substitute(&self, args: &Value) -> Vec<String> {
        let empty = Map::new();
        let obj = args.as_object().unwrap_or(&empty);
        self.args_template
            .iter()
            .map(|tpl| render_template(tpl, obj))
            .collect()
    }

    fn missing_params(&self, args: &Value) -> Vec<&str> {
        self.params
            .iter()
            .filter(|p| args.get(p.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect()
    }
}

fn render_template(template: &str, args: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = &rest[open + 2..open + 2 + close];
        match args.get(key) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => out.push_str(&rest[open..open + 4 + close]),
        }
        rest = &rest[open + 4 + close..];
    }
    out.push_str(rest);
    out
}

#[async_trait]
impl Tool for PluginTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.clone(), json!({ "type": "string" })))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.params,
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let missing = self.missing_params(&args);
        if !missing.is_empty() {
            return Err(format!("missing arguments: {}", missing.join(", ")));
        }
        let argv = self.substitute(&args);
        tracing::info!(tool = %self.name, program = %self.program, "plugin tool invoke");
        let child = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("plugin spawn failed: {e}"))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("plugin timeout after {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("plugin wait failed: {e}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("exit {:?}: {}", output.status.code(), stderr.trim()));
        }
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(serde_json::from_str(&stdout).unwrap_or(Value::String(stdout)))
    }
}
