use agenticlaw_core::{Capability, Decision, Effect, Operation, Risk, ToolCall};
use agenticlaw_policy::{
    DefaultAllow, ExecutionEnvironment, Hook, PolicyChain, RequireReadBeforeWrite, RouteCommandExecution,
    RouteOutcome, StaticWindow, ToolInput,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

fn call(name: &str, args: HashMap<String, serde_json::Value>) -> ToolCall {
    ToolCall {
        id: "call-1".into(),
        name: name.into(),
        args,
    }
}

#[tokio::test]
async fn default_allow_chain_allows_unknown_tools() {
    let chain = PolicyChain::new(vec![Arc::new(DefaultAllow)]);
    let input = ToolInput {
        call: call("whatever", HashMap::new()),
        capability: Capability::new(vec![], Risk::Unknown),
        decision: Decision::allow(),
    };
    let out = chain.run_before_tool(input).await.unwrap();
    assert_eq!(out.decision.effect, Effect::Allow);
}

#[tokio::test]
async fn read_before_write_gate_composes_with_default_allow() {
    let workspace = PathBuf::from("/workspace");
    let require_read = RequireReadBeforeWrite::new("READ", workspace, Arc::new(StaticWindow(vec![])));
    let chain = PolicyChain::new(vec![Arc::new(DefaultAllow), Arc::new(require_read)]);

    let mut args = HashMap::new();
    args.insert("path".to_string(), serde_json::json!("secrets.txt"));
    let input = ToolInput {
        call: call("WRITE", args),
        capability: Capability::new(vec![Operation::FileWrite], Risk::Medium),
        decision: Decision::allow(),
    };
    let out = chain.run_before_tool(input).await.unwrap();
    assert_eq!(out.decision.effect, Effect::Deny);
}

struct AlwaysSandbox;
#[async_trait::async_trait]
impl ExecutionEnvironment for AlwaysSandbox {
    async fn decide_route(&self, _command: &str, _sandbox_permission: bool) -> RouteOutcome {
        RouteOutcome::Sandbox
    }
}

struct AlwaysHostApproval;
#[async_trait::async_trait]
impl ExecutionEnvironment for AlwaysHostApproval {
    async fn decide_route(&self, _command: &str, _sandbox_permission: bool) -> RouteOutcome {
        RouteOutcome::HostApproval {
            reason: "no sandbox available".into(),
        }
    }
}

#[tokio::test]
async fn command_routing_denies_obfuscated_commands_before_consulting_environment() {
    let hook = RouteCommandExecution::new("BASH", true, Arc::new(AlwaysSandbox));
    let mut args = HashMap::new();
    args.insert("command".to_string(), serde_json::json!("echo cm0gLXJmIC8= | base64 -d | bash"));
    let input = ToolInput {
        call: call("BASH", args),
        capability: Capability::new(vec![Operation::Exec], Risk::High),
        decision: Decision::allow(),
    };
    let out = hook.before_tool(input).await.unwrap();
    assert_eq!(out.decision.effect, Effect::Deny);
}

#[tokio::test]
async fn command_routing_allows_and_routes_to_sandbox() {
    let hook = RouteCommandExecution::new("BASH", true, Arc::new(AlwaysSandbox));
    let mut args = HashMap::new();
    args.insert("command".to_string(), serde_json::json!("ls -la"));
    let input = ToolInput {
        call: call("BASH", args),
        capability: Capability::new(vec![Operation::Exec], Risk::Medium),
        decision: Decision::allow(),
    };
    let out = hook.before_tool(input).await.unwrap();
    assert_eq!(out.decision.effect, Effect::Allow);
}

#[tokio::test]
async fn command_routing_requires_approval_when_no_sandbox() {
    let hook = RouteCommandExecution::new("BASH", false, Arc::new(AlwaysHostApproval));
    let mut args = HashMap::new();
    args.insert("command".to_string(), serde_json::json!("rm report.txt"));
    let input = ToolInput {
        call: call("BASH", args),
        capability: Capability::new(vec![Operation::Exec], Risk::Medium),
        decision: Decision::allow(),
    };
    let out = hook.before_tool(input).await.unwrap();
    assert_eq!(out.decision.effect, Effect::RequireApproval);
}

#[tokio::test]
async fn a_deny_from_one_hook_survives_a_later_permissive_hook() {
    let workspace = PathBuf::from("/workspace");
    let require_read = RequireReadBeforeWrite::new("READ", workspace, Arc::new(StaticWindow(vec![])));
    // DefaultAllow runs after the gate and must not loosen its denial.
    let chain = PolicyChain::new(vec![Arc::new(require_read), Arc::new(DefaultAllow)]);

    let mut args = HashMap::new();
    args.insert("path".to_string(), serde_json::json!("config.toml"));
    let input = ToolInput {
        call: call("WRITE", args),
        capability: Capability::new(vec![Operation::FileWrite], Risk::Medium),
        decision: Decision::allow(),
    };
    let out = chain.run_before_tool(input).await.unwrap();
    assert_eq!(out.decision.effect, Effect::Deny);
}
