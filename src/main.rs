//! AgentFlow - 多角色编排引擎
//!
//! 入口：初始化日志、加载配置、构建引擎，从命令行参数（或 stdin）读取任务并输出最终回答。

use std::io::Read;

use agentflow::{config::load_config, memory::Message, observability, EngineBuilder};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config(None).context("Failed to load config")?;
    let engine = EngineBuilder::new(config)
        .build()
        .context("Failed to build engine")?;

    let mut task = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if task.trim().is_empty() {
        std::io::stdin()
            .read_to_string(&mut task)
            .context("Failed to read task from stdin")?;
    }
    let task = task.trim();
    if task.is_empty() {
        anyhow::bail!("usage: agentflow <task>  (or pipe the task on stdin)");
    }

    let answer = engine
        .run(vec![Message::user(task)])
        .await
        .context("Run failed")?;
    println!("{}", answer.content);

    Ok(())
}
