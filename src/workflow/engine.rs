//! 工作流引擎：Planner -> Executor -> {Tool -> Executor}* -> Critic -> Done
//!
//! 单次 Run 内严格串行；多个 Run 可并发共享同一引擎（注册表只读，缓存自带并发安全）。
//! 每个挂起点（补全调用、工具调用）都可被 CancellationToken 打断。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::CompletionCapability;
use crate::memory::{Message, ToolCall};
use crate::tools::{ToolExecutor, ToolRegistry};
use crate::workflow::events::RunEvent;
use crate::workflow::roles::{RolePrompts, RoleStep};
use crate::workflow::router::route_after_executor;
use crate::workflow::tool_step::invoke_tool;
use crate::workflow::types::{Route, Run, RunOutcome, RunPhase};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 单次 Run 的调用方选项
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub cancel_token: CancellationToken,
    pub event_tx: Option<UnboundedSender<RunEvent>>,
}

impl RunOptions {
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }
}

pub struct WorkflowEngine {
    model: Arc<dyn CompletionCapability>,
    tools: ToolExecutor,
    planner: RoleStep,
    executor: RoleStep,
    critic: RoleStep,
    completion_timeout: Duration,
    max_tool_iterations: usize,
}

impl WorkflowEngine {
    /// 注册表在此处注入，之后只读
    pub fn new(
        model: Arc<dyn CompletionCapability>,
        registry: Arc<ToolRegistry>,
        prompts: RolePrompts,
    ) -> Self {
        Self {
            model,
            tools: ToolExecutor::new(registry, Duration::from_secs(30)),
            planner: RoleStep::planner(prompts.planner),
            executor: RoleStep::executor(prompts.executor),
            critic: RoleStep::critic(prompts.critic),
            completion_timeout: Duration::from_secs(60),
            max_tool_iterations: 8,
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tools = self.tools.with_timeout(timeout);
        self
    }

    pub fn with_max_tool_iterations(mut self, limit: usize) -> Self {
        self.max_tool_iterations = limit;
        self
    }

    pub fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }

    /// 入口：跑完整个状态机，返回最终消息（Critic 的输出）
    pub async fn run(&self, seed: Vec<Message>) -> Result<Message, AgentError> {
        self.run_with(seed, RunOptions::default())
            .await
            .map(|outcome| outcome.final_message)
    }

    /// 带取消与事件推送的入口，返回完整对话以便外部持久化
    pub async fn run_with(
        &self,
        seed: Vec<Message>,
        options: RunOptions,
    ) -> Result<RunOutcome, AgentError> {
        let result = self.drive(seed, &options).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "run aborted");
            options.emit(RunEvent::Error { text: e.to_string() });
        }
        result
    }

    async fn drive(&self, seed: Vec<Message>, options: &RunOptions) -> Result<RunOutcome, AgentError> {
        if seed.is_empty() {
            return Err(AgentError::EmptyConversation);
        }
        let descriptors = self.tools.registry().descriptors();
        let mut run = Run::new(seed);
        let cancel = &options.cancel_token;

        options.emit(RunEvent::Phase { phase: RunPhase::Planning, step: run.step_count });
        let plan = guard(cancel, self.planner.run(self.model.as_ref(), &run.state, &[], self.completion_timeout)).await??;
        run.record(plan);

        loop {
            run.transition(RunPhase::Executing);
            options.emit(RunEvent::Phase { phase: RunPhase::Executing, step: run.step_count });
            let mut reply = guard(
                cancel,
                self.executor.run(self.model.as_ref(), &run.state, &descriptors, self.completion_timeout),
            )
            .await??;
            // call_id 在一次 Run 内必须唯一，否则工具结果无法唯一回指
            if let Some(call) = reply.tool_call.as_mut() {
                if call.call_id.is_empty() || run.state.has_tool_call(&call.call_id) {
                    let fresh = ToolCall::mint_call_id();
                    tracing::warn!(tool = %call.name, reused = %call.call_id, call_id = %fresh, "re-minting reused tool call id");
                    call.call_id = fresh;
                }
            }
            let route = route_after_executor(&reply);
            run.record(reply);

            let call = match route {
                Route::Critiquing => break,
                Route::ToolInvoking(call) => call,
            };
            if run.tool_call_count >= self.max_tool_iterations {
                return Err(AgentError::RunNotTerminating { limit: self.max_tool_iterations });
            }

            run.transition(RunPhase::ToolInvoking);
            options.emit(RunEvent::Phase { phase: RunPhase::ToolInvoking, step: run.step_count });
            options.emit(RunEvent::ToolCall {
                tool: call.name.clone(),
                call_id: call.call_id.clone(),
                args: serde_json::Value::Object(call.arguments.clone()),
            });
            let output = guard(cancel, invoke_tool(&self.tools, &call)).await?;
            run.tool_call_count += 1;
            if let Some(err) = &output.failure {
                options.emit(RunEvent::ToolFailure { tool: call.name.clone(), reason: err.to_string() });
            }
            options.emit(RunEvent::Observation {
                call_id: call.call_id.clone(),
                preview: preview(&output.message.content),
            });
            run.record(output.message);
        }

        run.transition(RunPhase::Critiquing);
        options.emit(RunEvent::Phase { phase: RunPhase::Critiquing, step: run.step_count });
        let final_message = guard(cancel, self.critic.run(self.model.as_ref(), &run.state, &[], self.completion_timeout)).await??;
        run.record(final_message.clone());
        run.transition(RunPhase::Done);

        tracing::info!(steps = run.step_count, tool_calls = run.tool_call_count, "run complete");
        options.emit(RunEvent::Done { steps: run.step_count, tool_calls: run.tool_call_count });
        Ok(RunOutcome {
            final_message,
            state: run.state,
            step_count: run.step_count,
            tool_call_count: run.tool_call_count,
        })
    }
}

/// 在取消令牌与挂起操作之间竞速；已取消的令牌优先
async fn guard<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Result<T, AgentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        out = fut => Ok(out),
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", content.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        content.to_string()
    }
}
