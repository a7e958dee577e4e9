//! 工作流集成测试：用脚本化补全能力与计数工具驱动公开 API

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use agentflow::cache::{Clock, InMemoryCache};
use agentflow::core::AgentError;
use agentflow::llm::{CompletionCapability, LlmError, MockLlmClient};
use agentflow::memory::{Message, Role, ToolCall};
use agentflow::tools::{cached, EchoTool, Tool, ToolDescriptor, ToolRegistry};
use agentflow::workflow::{RolePrompts, RunEvent, RunOptions, RunPhase, WorkflowEngine};

const PLANNER: &str = "PLANNER";
const EXECUTOR: &str = "EXECUTOR";
const CRITIC: &str = "CRITIC";

fn prompts() -> RolePrompts {
    RolePrompts::new(PLANNER, EXECUTOR, CRITIC)
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// 按顺序返回预置消息，并记录每次调用的角色指令与可见工具数
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    calls: Mutex<Vec<(String, usize)>>,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<Message, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn instructions(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(i, _)| i.clone()).collect()
    }
}

#[async_trait]
impl CompletionCapability for ScriptedModel {
    async fn complete(
        &self,
        role_instruction: &str,
        _history: &[Message],
        available_tools: &[ToolDescriptor],
    ) -> Result<Message, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((role_instruction.to_string(), available_tools.len()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Request("script exhausted".into())))
    }
}

/// 无状态模型：Executor 先用 echo 复述用户任务，拿到结果后作答；Critic 原样通过
struct EchoingModel;

#[async_trait]
impl CompletionCapability for EchoingModel {
    async fn complete(
        &self,
        role_instruction: &str,
        history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<Message, LlmError> {
        tokio::task::yield_now().await;
        let last = history.last().ok_or(LlmError::EmptyResponse)?;
        match role_instruction {
            PLANNER => Ok(Message::assistant("1. echo the task")),
            EXECUTOR if last.role == Role::ToolResult => {
                Ok(Message::assistant(format!("echoed: {}", last.content)))
            }
            EXECUTOR => {
                let task = history[0].content.clone();
                Ok(Message::assistant_tool_call(
                    "",
                    ToolCall::new("echo", args(json!({ "text": task }))),
                ))
            }
            _ => Ok(Message::assistant(last.content.clone())),
        }
    }
}

/// 永不返回的模型（模拟补全服务挂起）
struct HangingModel {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionCapability for HangingModel {
    async fn complete(
        &self,
        _role_instruction: &str,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<Message, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<Result<Message, LlmError>>().await
    }
}

/// 计数工具：返回固定 JSON
struct CountingTool {
    name: &'static str,
    result: Value,
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    fn new(name: &'static str, result: Value) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                name,
                result,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "counting test tool"
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

fn weather_call(id: &str) -> Message {
    Message::assistant_tool_call(
        "",
        ToolCall::new("get_weather", args(json!({"city": "Delhi"}))).with_call_id(id),
    )
}

fn manual_clock() -> (Arc<AtomicI64>, Clock) {
    let offset = Arc::new(AtomicI64::new(0));
    let base = Utc::now();
    let o = offset.clone();
    let clock: Clock = Arc::new(move || base + chrono::Duration::seconds(o.load(Ordering::SeqCst)));
    (offset, clock)
}

#[tokio::test]
async fn test_weather_question_runs_full_pipeline() {
    let (weather, weather_calls) =
        CountingTool::new("get_weather", json!({"temp_C": "31", "humidity": "40"}));
    let mut registry = ToolRegistry::new();
    registry.register(weather).unwrap();

    let model = Arc::new(ScriptedModel::new(vec![
        Ok(Message::assistant("1. Look up Delhi weather. 2. Summarise.")),
        Ok(weather_call("c1")),
        Ok(Message::assistant("It is 31°C with 40% humidity in Delhi.")),
        Ok(Message::assistant("Delhi is currently 31°C with 40% humidity.")),
    ]));
    let engine = WorkflowEngine::new(model.clone(), Arc::new(registry), prompts());

    let seed = vec![Message::user("What's the weather in Delhi?")];
    let outcome = engine.run_with(seed.clone(), RunOptions::default()).await.unwrap();

    assert_eq!(outcome.final_message.content, "Delhi is currently 31°C with 40% humidity.");
    assert_eq!(outcome.final_message.role, Role::Assistant);
    assert_eq!(weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.tool_call_count, 1);
    assert_eq!(outcome.step_count, 5);

    let messages = outcome.state.messages();
    assert_eq!(messages.len(), seed.len() + 5);
    assert_eq!(messages[0], seed[0]);
    let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::Assistant,
            Role::ToolResult,
            Role::Assistant,
            Role::Assistant
        ]
    );
    assert_eq!(messages[3].tool_result_of.as_deref(), Some("c1"));
    let observed: Value = serde_json::from_str(&messages[3].content).unwrap();
    assert_eq!(observed, json!({"temp_C": "31", "humidity": "40"}));
    outcome.state.verify_tool_links().unwrap();

    // 只有 Executor 看得到工具
    let calls = model.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            (PLANNER.to_string(), 0),
            (EXECUTOR.to_string(), 1),
            (EXECUTOR.to_string(), 1),
            (CRITIC.to_string(), 0),
        ]
    );
}

#[tokio::test]
async fn test_unknown_tool_falls_back_to_another() {
    let (search, search_calls) = CountingTool::new("web_search", json!(["ACME closed at 42.10"]));
    let mut registry = ToolRegistry::new();
    registry.register(search).unwrap();

    let model = Arc::new(ScriptedModel::new(vec![
        Ok(Message::assistant("Get the ACME price.")),
        Ok(Message::assistant_tool_call(
            "",
            ToolCall::new("stock_price", args(json!({"symbol": "ACME"}))).with_call_id("s1"),
        )),
        Ok(Message::assistant_tool_call(
            "",
            ToolCall::new("web_search", args(json!({"query": "ACME stock price"}))).with_call_id("s2"),
        )),
        Ok(Message::assistant("ACME closed at 42.10.")),
        Ok(Message::assistant("ACME last closed at 42.10.")),
    ]));
    let engine = WorkflowEngine::new(model.clone(), Arc::new(registry), prompts());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let outcome = engine
        .run_with(
            vec![Message::user("Price of ACME?")],
            RunOptions::default().with_event_tx(tx),
        )
        .await
        .unwrap();

    let messages = outcome.state.messages();
    let not_found = &messages[3];
    assert_eq!(not_found.role, Role::ToolResult);
    assert_eq!(not_found.tool_result_of.as_deref(), Some("s1"));
    assert!(not_found.content.starts_with("Tool 'stock_price' not found."));
    assert_eq!(messages[5].tool_result_of.as_deref(), Some("s2"));
    assert_eq!(search_calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.tool_call_count, 2);
    assert_eq!(outcome.final_message.content, "ACME last closed at 42.10.");
    outcome.state.verify_tool_links().unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(RunEvent::Phase { phase: RunPhase::Planning, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::ToolFailure { tool, .. } if tool == "stock_price")));
    assert!(matches!(events.last(), Some(RunEvent::Done { tool_calls: 2, .. })));
}

#[tokio::test]
async fn test_planner_timeout_is_fatal() {
    let (weather, weather_calls) = CountingTool::new("get_weather", json!({}));
    let mut registry = ToolRegistry::new();
    registry.register(weather).unwrap();
    let model = Arc::new(HangingModel { calls: AtomicUsize::new(0) });
    let engine = WorkflowEngine::new(model.clone(), Arc::new(registry), prompts())
        .with_completion_timeout(Duration::from_millis(50));

    let err = engine.run(vec![Message::user("hi")]).await.unwrap_err();

    assert!(matches!(err, AgentError::ModelService(LlmError::Timeout(_))));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert_eq!(weather_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_model_failure_mid_run_is_fatal() {
    let model = Arc::new(ScriptedModel::new(vec![
        Ok(Message::assistant("plan")),
        Err(LlmError::Request("503 Service Unavailable".into())),
    ]));
    let engine = WorkflowEngine::new(model.clone(), Arc::new(ToolRegistry::new()), prompts());

    let err = engine.run(vec![Message::user("hi")]).await.unwrap_err();

    assert!(matches!(err, AgentError::ModelService(LlmError::Request(_))));
    assert_eq!(model.instructions(), vec![PLANNER.to_string(), EXECUTOR.to_string()]);
}

#[tokio::test]
async fn test_cache_hit_skips_inner_tool() {
    let (weather, weather_calls) = CountingTool::new("get_weather", json!({"temp_C": "31"}));
    let cache = Arc::new(InMemoryCache::new());
    let mut registry = ToolRegistry::new();
    registry
        .register(cached(Arc::new(weather), cache.clone(), Duration::from_secs(3600)))
        .unwrap();
    let registry = Arc::new(registry);

    let script = || {
        Arc::new(ScriptedModel::new(vec![
            Ok(Message::assistant("plan")),
            Ok(weather_call("w")),
            Ok(Message::assistant("31°C")),
            Ok(Message::assistant("31°C")),
        ]))
    };

    let first = WorkflowEngine::new(script(), registry.clone(), prompts())
        .run_with(vec![Message::user("Delhi weather")], RunOptions::default())
        .await
        .unwrap();
    let second = WorkflowEngine::new(script(), registry.clone(), prompts())
        .run_with(vec![Message::user("Delhi weather")], RunOptions::default())
        .await
        .unwrap();

    assert_eq!(weather_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(first.state.messages()[3].content, second.state.messages()[3].content);
}

#[tokio::test]
async fn test_expired_cache_entry_refills_once() {
    let (weather, weather_calls) = CountingTool::new("get_weather", json!({"temp_C": "31"}));
    let (offset, clock) = manual_clock();
    let cache = Arc::new(InMemoryCache::with_clock(clock));
    let mut registry = ToolRegistry::new();
    registry
        .register(cached(Arc::new(weather), cache.clone(), Duration::from_secs(3600)))
        .unwrap();
    let registry = Arc::new(registry);

    let run = || {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(Message::assistant("plan")),
            Ok(weather_call("w")),
            Ok(Message::assistant("31°C")),
            Ok(Message::assistant("31°C")),
        ]));
        let engine = WorkflowEngine::new(model, registry.clone(), prompts());
        async move { engine.run(vec![Message::user("Delhi weather")]).await }
    };

    run().await.unwrap();
    offset.store(3599, Ordering::SeqCst);
    run().await.unwrap();
    assert_eq!(weather_calls.load(Ordering::SeqCst), 1);

    offset.store(3601, Ordering::SeqCst);
    run().await.unwrap();
    assert_eq!(weather_calls.load(Ordering::SeqCst), 2);
    run().await.unwrap();
    assert_eq!(weather_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_endless_tool_loop_is_bounded() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let mut script = vec![Ok(Message::assistant("plan"))];
    for i in 0..10 {
        script.push(Ok(Message::assistant_tool_call(
            "",
            ToolCall::new("echo", args(json!({"text": "again"}))).with_call_id(format!("e{i}")),
        )));
    }
    let model = Arc::new(ScriptedModel::new(script));
    let engine = WorkflowEngine::new(model.clone(), Arc::new(registry), prompts())
        .with_max_tool_iterations(2);

    let err = engine.run(vec![Message::user("loop")]).await.unwrap_err();

    assert!(matches!(err, AgentError::RunNotTerminating { limit: 2 }));
    // planner + 3 次 executor，critic 从未运行
    assert_eq!(model.instructions().len(), 4);
    assert!(!model.instructions().contains(&CRITIC.to_string()));
}

#[tokio::test]
async fn test_cancelled_token_stops_before_any_step() {
    let model = Arc::new(ScriptedModel::new(vec![Ok(Message::assistant("plan"))]));
    let engine = WorkflowEngine::new(model.clone(), Arc::new(ToolRegistry::new()), prompts());
    let token = CancellationToken::new();
    token.cancel();

    let err = engine
        .run_with(
            vec![Message::user("hi")],
            RunOptions::default().with_cancel_token(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert!(model.instructions().is_empty());
}

#[tokio::test]
async fn test_cancel_while_model_pending() {
    let model = Arc::new(HangingModel { calls: AtomicUsize::new(0) });
    let engine = WorkflowEngine::new(model.clone(), Arc::new(ToolRegistry::new()), prompts());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let err = engine
        .run_with(
            vec![Message::user("hi")],
            RunOptions::default().with_cancel_token(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_seed_rejected() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let engine = WorkflowEngine::new(model.clone(), Arc::new(ToolRegistry::new()), prompts());
    let err = engine.run(Vec::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::EmptyConversation));
    assert!(model.instructions().is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let engine = Arc::new(WorkflowEngine::new(Arc::new(EchoingModel), Arc::new(registry), prompts()));

    let runs = (0..8).map(|i| {
        let engine = engine.clone();
        async move {
            engine
                .run_with(vec![Message::user(format!("task-{i}"))], RunOptions::default())
                .await
        }
    });
    let outcomes = futures_util::future::join_all(runs).await;

    for (i, outcome) in outcomes.into_iter().enumerate() {
        let outcome = outcome.unwrap();
        assert_eq!(outcome.final_message.content, format!("echoed: task-{i}"));
        assert_eq!(outcome.state.len(), 6);
        outcome.state.verify_tool_links().unwrap();
    }
}

#[tokio::test]
async fn test_json_protocol_end_to_end() {
    let llm = Arc::new(MockLlmClient::new(vec![
        Ok("1. Call echo with pong.".into()),
        Ok(r#"{"tool": "echo", "args": {"text": "pong"}}"#.into()),
        Ok("The tool said pong.".into()),
        Ok("The tool replied: pong.".into()),
    ]));
    let engine = agentflow::EngineBuilder::new(agentflow::config::AppConfig::default())
        .build_with_client(llm.clone())
        .unwrap();

    let answer = engine.run(vec![Message::user("say pong")]).await.unwrap();

    assert_eq!(answer.content, "The tool replied: pong.");
    let requests = llm.requests();
    assert_eq!(requests.len(), 4);
    // 第二次 Executor 请求中包含工具观察
    assert!(requests[2]
        .iter()
        .any(|m| m.role == Role::User && m.content.starts_with("Observation for call_") && m.content.ends_with(": pong")));
    // Planner 的系统指令里没有工具清单
    assert!(!requests[0][0].content.contains("## Available tools"));
    assert!(requests[1][0].content.contains("## Available tools"));
}

#[tokio::test]
async fn test_reused_call_id_is_reminted() {
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let echo = |text: &str| -> Result<Message, LlmError> {
        Ok(Message::assistant_tool_call(
            "",
            ToolCall::new("echo", args(json!({ "text": text }))).with_call_id("c1"),
        ))
    };
    let model = Arc::new(ScriptedModel::new(vec![
        Ok(Message::assistant("plan")),
        echo("one"),
        echo("two"),
        Ok(Message::assistant("one, two")),
        Ok(Message::assistant("one, two.")),
    ]));
    let engine = WorkflowEngine::new(model, Arc::new(registry), prompts());

    let outcome = engine
        .run_with(vec![Message::user("echo twice")], RunOptions::default())
        .await
        .unwrap();

    let messages = outcome.state.messages();
    assert_eq!(messages[3].tool_result_of.as_deref(), Some("c1"));
    let second = messages[4].tool_call.as_ref().unwrap();
    assert_ne!(second.call_id, "c1");
    assert_eq!(messages[5].tool_result_of.as_deref(), Some(second.call_id.as_str()));
    assert_eq!(messages[5].content, "two");
    outcome.state.verify_tool_links().unwrap();
}

#[tokio::test]
async fn test_json_protocol_ignores_model_call_ids() {
    let llm = Arc::new(MockLlmClient::new(vec![
        Ok("1. Echo twice.".into()),
        Ok(r#"{"tool": "echo", "args": {"text": "one"}, "id": "c1"}"#.into()),
        Ok(r#"{"tool": "echo", "args": {"text": "two"}, "id": "c1"}"#.into()),
        Ok(r#"{"result": ["one", "two"]}"#.into()),
        Ok(r#"{"result": ["one", "two"]}"#.into()),
    ]));
    let engine = agentflow::EngineBuilder::new(agentflow::config::AppConfig::default())
        .build_with_client(llm)
        .unwrap();

    let outcome = engine
        .run_with(vec![Message::user("echo twice as JSON")], RunOptions::default())
        .await
        .unwrap();

    // JSON 格式的最终回答不是工具调用，也不是错误
    assert_eq!(outcome.final_message.content, r#"{"result": ["one", "two"]}"#);
    assert_eq!(outcome.tool_call_count, 2);
    outcome.state.verify_tool_links().unwrap();
}

#[tokio::test]
async fn test_critic_json_example_is_final_content() {
    let critic_reply = "Here is an example config:\n```json\n{\"port\": 8080}\n```";
    let llm = Arc::new(MockLlmClient::new(vec![
        Ok("1. Show a config.".into()),
        Ok("Use port 8080.".into()),
        Ok(critic_reply.into()),
    ]));
    let engine = agentflow::EngineBuilder::new(agentflow::config::AppConfig::default())
        .build_with_client(llm)
        .unwrap();

    let answer = engine.run(vec![Message::user("example config?")]).await.unwrap();

    assert_eq!(answer.content, critic_reply);
}
