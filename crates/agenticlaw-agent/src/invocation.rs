//! The invocation context the agent loop (component G) runs inside: an
//! immutable handle on the model, tool registry, and policy chain for one
//! run, plus the knobs §4.2 leaves to the caller (system prompt, whether to
//! surface streaming partials as events).

use agenticlaw_core::{Error, Event, SessionKey};
use agenticlaw_llm::Model;
use agenticlaw_policy::PolicyChain;
use agenticlaw_tools::ToolRegistry;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Sentinel key under which the normalized tool-call `Decision` is attached
/// to a tool's `args` before invocation (§4.3's "decision context
/// propagation"). Tools that branch on execution route (sandbox vs host)
/// read this key and remove it before interpreting the rest of `args` as
/// their own schema.
pub const DECISION_CONTEXT_KEY: &str = "__decision";

/// The lazy event sequence the agent loop (and the runtime that wraps it)
/// produce. At most one `Err` arrives, always as the last item.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<Event, Error>> + Send>>;

/// One invocation of the agent loop: the model/tools/policies collaborators
/// plus the per-run knobs the runtime resolves from `RuntimeConfig` before
/// calling in. Built fresh per `Run`; never shared across runs.
pub struct InvocationContext {
    pub session_id: SessionKey,
    pub model: Arc<dyn Model>,
    pub tools: Arc<ToolRegistry>,
    pub policies: PolicyChain,
    /// Prefixed ahead of the projected history on every model call, as a
    /// system message, when present.
    pub system_prompt: Option<String>,
    /// When set, streaming partial fragments carrying non-empty reasoning or
    /// text are turned into `meta.partial = true` events (§4.2 step 3).
    pub emit_partial_events: bool,
    pub cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(
        session_id: SessionKey,
        model: Arc<dyn Model>,
        tools: Arc<ToolRegistry>,
        policies: PolicyChain,
    ) -> Self {
        Self {
            session_id,
            model,
            tools,
            policies,
            system_prompt: None,
            emit_partial_events: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_emit_partial_events(mut self, emit: bool) -> Self {
        self.emit_partial_events = emit;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
