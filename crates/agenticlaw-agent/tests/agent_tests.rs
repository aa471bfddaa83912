//! Integration tests for the agent loop (component G) against the reference
//! mock model and a couple of in-test tools, exercising the turn cycle
//! end-to-end rather than any one step in isolation.

use agenticlaw_agent::{agent_loop, InvocationContext};
use agenticlaw_core::{Event, SessionKey};
use agenticlaw_llm::{ScriptedModel, ScriptedTurn};
use agenticlaw_policy::PolicyChain;
use agenticlaw_tools::{Tool, ToolRegistry, ToolResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn session_id() -> SessionKey {
    SessionKey::new("app", "user", "s1")
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes its input back"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn run(&self, args: Value) -> Result<ToolResult, agenticlaw_core::Error> {
        Ok(ToolResult::Json(args))
    }
}

struct CountingEchoTool {
    calls: AtomicUsize,
}

#[async_trait]
impl Tool for CountingEchoTool {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "echoes and counts calls"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }
    async fn run(&self, args: Value) -> Result<ToolResult, agenticlaw_core::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::Json(args))
    }
}

async fn collect(ctx: InvocationContext, history: Vec<Event>) -> Result<Vec<Event>, agenticlaw_core::Error> {
    let mut stream = agent_loop(ctx, history);
    let mut events = Vec::new();
    while let Some(item) = stream.next().await {
        events.push(item?);
    }
    Ok(events)
}

#[tokio::test]
async fn a_turn_with_no_tool_calls_produces_one_assistant_event_and_stops() {
    let model = Arc::new(ScriptedModel::new(
        "mock",
        vec![ScriptedTurn::text("hello there")],
    ));
    let ctx = InvocationContext::new(
        session_id(),
        model,
        Arc::new(ToolRegistry::new()),
        PolicyChain::default(),
    );
    let events = collect(ctx, Vec::new()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message.text, "hello there");
    assert!(events[0].message.tool_calls.is_empty());
}

#[tokio::test]
async fn a_tool_call_is_executed_and_its_response_fed_back_in() {
    let model = Arc::new(ScriptedModel::new(
        "mock",
        vec![
            ScriptedTurn::tool_call("echo", "call-1", serde_json::json!({"x": 1})),
            ScriptedTurn::text("done"),
        ],
    ));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let ctx = InvocationContext::new(session_id(), model, Arc::new(registry), PolicyChain::default());

    let events = collect(ctx, Vec::new()).await.unwrap();
    // assistant(tool_call) -> tool_response -> assistant(done)
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].message.tool_calls.len(), 1);
    let response = events[1].message.tool_response.as_ref().unwrap();
    assert_eq!(response.id, "call-1");
    assert_eq!(events[2].message.text, "done");
}

#[tokio::test]
async fn a_call_repeated_three_times_is_rejected_and_the_run_stops() {
    let same_call = ScriptedTurn::tool_call("echo", "call-1", serde_json::json!({"x": 1}));
    let model = Arc::new(ScriptedModel::new(
        "mock",
        vec![same_call.clone(), same_call.clone(), same_call],
    ));
    let tool = Arc::new(CountingEchoTool {
        calls: AtomicUsize::new(0),
    });
    let mut registry = ToolRegistry::new();
    registry
        .register(CountingEchoToolHandle(tool.clone()))
        .unwrap();
    let ctx = InvocationContext::new(session_id(), model, Arc::new(registry), PolicyChain::default());

    let events = collect(ctx, Vec::new()).await.unwrap();
    // Every scripted turn reuses the exact same tool_call id/name/args, so the
    // guard keys off of `name + canonical(args)`, not the call id: it fires
    // on the third occurrence regardless of id reuse.
    let tool_responses: Vec<_> = events
        .iter()
        .filter_map(|e| e.message.tool_response.as_ref())
        .collect();
    assert_eq!(tool_responses.len(), 3);
    let last = tool_responses.last().unwrap();
    assert_eq!(
        last.result.get("error").and_then(Value::as_str),
        Some("duplicate tool call detected")
    );
    // Only the first two occurrences actually ran the tool; the third was
    // intercepted by the guard before dispatch.
    assert_eq!(tool.calls.load(Ordering::SeqCst), 2);
}

/// Wraps a shared counting tool so the same counter can be observed from the
/// test after the registry (which owns the tool via `Arc<dyn Tool>`) has
/// taken it.
struct CountingEchoToolHandle(Arc<CountingEchoTool>);

#[async_trait]
impl Tool for CountingEchoToolHandle {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn description(&self) -> &str {
        self.0.description()
    }
    fn input_schema(&self) -> Value {
        self.0.input_schema()
    }
    async fn run(&self, args: Value) -> Result<ToolResult, agenticlaw_core::Error> {
        self.0.run(args).await
    }
}

#[tokio::test]
async fn a_denied_tool_call_produces_an_error_response_and_the_loop_continues() {
    use agenticlaw_core::{Decision, Effect};
    use agenticlaw_policy::{Hook, ToolInput};

    struct DenyEcho;
    #[async_trait]
    impl Hook for DenyEcho {
        fn name(&self) -> &str {
            "deny-echo"
        }
        async fn before_tool(&self, mut input: ToolInput) -> Result<ToolInput, agenticlaw_core::Error> {
            if input.call.name == "echo" {
                input.decision = Decision::deny("echo is not allowed in this test");
            }
            Ok(input)
        }
    }

    let model = Arc::new(ScriptedModel::new(
        "mock",
        vec![
            ScriptedTurn::tool_call("echo", "call-1", serde_json::json!({})),
            ScriptedTurn::text("done"),
        ],
    ));
    let mut registry = ToolRegistry::new();
    registry.register(EchoTool).unwrap();
    let policies = PolicyChain::new(vec![Arc::new(DenyEcho)]);
    let ctx = InvocationContext::new(session_id(), model, Arc::new(registry), policies);

    let events = collect(ctx, Vec::new()).await.unwrap();
    let response = events[1].message.tool_response.as_ref().unwrap();
    assert_eq!(
        response.result.get("error").and_then(Value::as_str),
        Some("echo is not allowed in this test")
    );
    assert!(matches!(
        Decision::deny("x").effect,
        Effect::Deny
    ));
    assert_eq!(events[2].message.text, "done");
}
