//! The policy chain contract (component D): envelopes, the `Hook` trait,
//! and the sequential `PolicyChain` that composes hooks in caller-supplied
//! order.

use agenticlaw_core::{Capability, Decision, Error, Message, ToolCall};
use agenticlaw_llm::ToolDeclaration;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Envelope passed to `Hook::before_model`: the messages about to be sent to
/// the model, plus the tool declarations offered alongside them.
#[derive(Clone, Debug)]
pub struct ModelInput {
    pub messages: Vec<Message>,
    pub tool_declarations: Vec<ToolDeclaration>,
}

/// Envelope passed to `Hook::before_tool`, before a tool call executes.
#[derive(Clone, Debug)]
pub struct ToolInput {
    pub call: ToolCall,
    pub capability: Capability,
    pub decision: Decision,
}

/// Envelope passed to `Hook::after_tool`, once a tool call has run (or been
/// denied). `result` is the raw result map on success; `err` carries the
/// tool's error message on failure.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub call: ToolCall,
    pub capability: Capability,
    pub decision: Decision,
    pub result: Option<HashMap<String, serde_json::Value>>,
    pub err: Option<String>,
}

/// Envelope passed to `Hook::before_output`, wrapping the assistant's final
/// message for a turn. Bypassed for partial streaming fragments (§9, open
/// question b): only the turn's final, non-partial message is run through
/// this hook.
#[derive(Clone, Debug)]
pub struct Output {
    pub message: Message,
}

/// One link in the policy chain. All four operations default to a
/// pass-through so a hook can override only the operations it cares about.
/// The chain runs these strictly sequentially in the order hooks were
/// supplied; the first error short-circuits the whole chain.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn before_model(&self, input: ModelInput) -> Result<ModelInput, Error> {
        Ok(input)
    }

    async fn before_tool(&self, input: ToolInput) -> Result<ToolInput, Error> {
        Ok(input)
    }

    async fn after_tool(&self, input: ToolOutput) -> Result<ToolOutput, Error> {
        Ok(input)
    }

    async fn before_output(&self, input: Output) -> Result<Output, Error> {
        Ok(input)
    }
}

/// An ordered composition of hooks. The chain never reorders its hooks; it
/// is the caller's responsibility to supply them in the intended precedence.
#[derive(Clone, Default)]
pub struct PolicyChain {
    hooks: Vec<Arc<dyn Hook>>,
}

impl PolicyChain {
    pub fn new(hooks: Vec<Arc<dyn Hook>>) -> Self {
        Self { hooks }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub async fn run_before_model(&self, mut input: ModelInput) -> Result<ModelInput, Error> {
        for hook in &self.hooks {
            input = hook.before_model(input).await?;
        }
        Ok(input)
    }

    /// Runs `before_tool` across the chain, normalizing the decision after
    /// every hook so a `deny`/`require_approval` verdict from an earlier
    /// hook is never silently loosened by a later one that merely passes the
    /// envelope through unchanged.
    pub async fn run_before_tool(&self, mut input: ToolInput) -> Result<ToolInput, Error> {
        for hook in &self.hooks {
            let prior = input.decision.clone();
            input = hook.before_tool(input).await?;
            input.decision = prior.most_restrictive(input.decision);
        }
        Ok(input)
    }

    pub async fn run_after_tool(&self, mut input: ToolOutput) -> Result<ToolOutput, Error> {
        for hook in &self.hooks {
            input = hook.after_tool(input).await?;
        }
        Ok(input)
    }

    pub async fn run_before_output(&self, mut input: Output) -> Result<Output, Error> {
        for hook in &self.hooks {
            input = hook.before_output(input).await?;
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenticlaw_core::Risk;

    struct AlwaysDeny;
    #[async_trait]
    impl Hook for AlwaysDeny {
        fn name(&self) -> &str {
            "always-deny"
        }
        async fn before_tool(&self, mut input: ToolInput) -> Result<ToolInput, Error> {
            input.decision = Decision::deny("nope");
            Ok(input)
        }
    }

    struct AlwaysAllow;
    #[async_trait]
    impl Hook for AlwaysAllow {
        fn name(&self) -> &str {
            "always-allow"
        }
        async fn before_tool(&self, mut input: ToolInput) -> Result<ToolInput, Error> {
            input.decision = Decision::allow();
            Ok(input)
        }
    }

    fn call() -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: "bash".into(),
            args: Default::default(),
        }
    }

    #[tokio::test]
    async fn a_later_hook_cannot_loosen_an_earlier_deny() {
        let chain = PolicyChain::new(vec![Arc::new(AlwaysDeny), Arc::new(AlwaysAllow)]);
        let input = ToolInput {
            call: call(),
            capability: Capability::new(vec![], Risk::Unknown),
            decision: Decision::allow(),
        };
        let out = chain.run_before_tool(input).await.unwrap();
        assert_eq!(out.decision.effect, agenticlaw_core::Effect::Deny);
    }

    #[tokio::test]
    async fn empty_chain_defaults_to_allow() {
        let chain = PolicyChain::default();
        let input = ToolInput {
            call: call(),
            capability: Capability::default(),
            decision: Decision::allow(),
        };
        let out = chain.run_before_tool(input).await.unwrap();
        assert_eq!(out.decision.effect, agenticlaw_core::Effect::Allow);
    }
}
