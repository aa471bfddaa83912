//! The runtime orchestrator (component H, §4.1): the one piece that drives
//! a full `Run` — leasing, lifecycle emission, recovery projection,
//! compaction dispatch, the agent loop, and the one-shot overflow retry.
//! Everything below it (the agent loop itself, policies, tools, the
//! compaction subsystem) is a library the orchestrator composes; nothing
//! about a specific model, tool, or product lives here.

use crate::config::RuntimeConfig;
use crate::lease::LeaseTable;
use agenticlaw_agent::{agent_loop, recovery_events, InvocationContext};
use agenticlaw_compaction::{compact, window_tokens as estimate_window_tokens, MapReduceStrategy, Strategy, Trigger};
use agenticlaw_core::error::codes;
use agenticlaw_core::{
    lifecycle_event, parse_lifecycle_payload, Error, Event, LifecyclePayload, LifecycleStatus,
    Message, Result as CoreResult, SessionKey, SessionStore,
};
use agenticlaw_llm::Model;
use agenticlaw_policy::PolicyChain;
use agenticlaw_tools::{ActivateRequest, DynamicToolsetBroker, ReadTool, Tool, ToolRegistry};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The lazy `(Event, Error)` sequence `Run` produces (§4.1): at most one
/// error, always last.
pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<Event, Error>> + Send>>;

/// One invocation of `Runtime::run`.
pub struct RunRequest {
    pub session: SessionKey,
    /// The user-input event's message — almost always `Message::user(text)`,
    /// but left as a full `Message` so a host can attach `reasoning` or
    /// other channels to the turn that starts a run.
    pub input: Message,
    pub model: Arc<dyn Model>,
    /// Caller-supplied tools for this run, merged with the mandatory
    /// built-in read tool and anything the dynamic toolset broker resolves.
    pub tools: Vec<Arc<dyn Tool>>,
    pub policies: PolicyChain,
    pub system_prompt: Option<String>,
    /// Languages to activate via the dynamic toolset broker in addition to
    /// whatever the context window's activation-tool history already names
    /// (§4.1 step 10).
    pub auto_activate: Vec<String>,
    /// Accepted but ignored (§8).
    pub max_steps: Option<u64>,
    pub cancel: CancellationToken,
}

impl RunRequest {
    pub fn new(session: SessionKey, text: impl Into<String>, model: Arc<dyn Model>) -> Self {
        Self {
            session,
            input: Message::user(text),
            model,
            tools: Vec::new(),
            policies: PolicyChain::default(),
            system_prompt: None,
            auto_activate: Vec::new(),
            max_steps: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_policies(mut self, policies: PolicyChain) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_auto_activate(mut self, languages: Vec<String>) -> Self {
        self.auto_activate = languages;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub struct CompactRequest {
    pub session: SessionKey,
    pub model: Arc<dyn Model>,
}

pub struct UsageRequest {
    pub session: SessionKey,
    /// Overrides `RuntimeConfig::compaction::default_context_window_tokens`
    /// when the caller knows the model's real window (e.g.
    /// `model.context_window_tokens()`).
    pub context_window_tokens: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct UsageReport {
    pub current_tokens: u64,
    pub window_tokens: u64,
    pub input_budget: u64,
    pub ratio: f64,
    pub event_count: usize,
}

pub struct RunStateRequest {
    pub session: SessionKey,
}

#[derive(Clone, Debug, Default)]
pub struct RunStateReport {
    pub has_lifecycle: bool,
    pub status: Option<LifecycleStatus>,
    pub phase: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub event_id: Option<String>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The runtime orchestrator. Cheap to clone: every field is an `Arc` (or,
/// for `RuntimeConfig`, small enough to clone outright), which is what lets
/// `run()` return a `'static` stream without borrowing `self`.
#[derive(Clone)]
pub struct Runtime {
    store: Arc<dyn SessionStore>,
    config: RuntimeConfig,
    leases: LeaseTable,
    strategy: Arc<dyn Strategy>,
    broker: Option<Arc<dyn DynamicToolsetBroker>>,
}

impl Runtime {
    pub fn new(store: Arc<dyn SessionStore>, config: RuntimeConfig) -> Self {
        Self {
            store,
            config,
            leases: LeaseTable::new(),
            strategy: Arc::new(MapReduceStrategy::new()),
            broker: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_broker(mut self, broker: Arc<dyn DynamicToolsetBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    fn capacity_tokens(&self, model: &dyn Model) -> u64 {
        let reported = model.context_window_tokens();
        if reported > 0 {
            reported
        } else {
            self.config.compaction.default_context_window_tokens
        }
    }

    /// Runs one invocation end to end, yielding each persisted event as it
    /// is produced (§4.1). At most one `Err` arrives, always last; a lost
    /// single-flight race yields nothing at all, not even an error event —
    /// the caller reads the `SessionBusy` error from the stream's sole item.
    pub fn run(&self, request: RunRequest) -> RunEventStream {
        let runtime = self.clone();
        Box::pin(try_stream! {
            // Step 1: validate.
            if !request.session.is_valid() {
                Err(Error::validation(
                    "session key requires non-empty app_name, user_id, and session_id",
                ))?;
            }
            if request.model.name().is_empty() {
                Err(Error::validation("model name must not be empty"))?;
            }
            if request.tools.iter().any(|t| t.name() == runtime.config.read_tool_name) {
                Err(Error::validation(format!(
                    "a tool named {} is reserved for the built-in read tool",
                    runtime.config.read_tool_name
                )))?;
            }

            // Step 2: single-flight lease. Nothing observable may happen
            // before this; a losing run emits zero events (I5, §5, §8).
            let _lease = match runtime.leases.try_acquire(&request.session) {
                Some(guard) => guard,
                None => {
                    warn!(session = %request.session, "run rejected: session busy");
                    Err(Error::SessionBusy)?;
                    unreachable!();
                }
            };
            info!(session = %request.session, "run starting");

            // Step 3: get or create.
            runtime.store.get_or_create(&request.session).await?;

            // Step 4: running lifecycle event.
            let running = lifecycle_event(request.session.clone(), LifecyclePayload::running("run"));
            runtime.store.append_event(&request.session, running.clone()).await?;
            yield running;

            // Step 5: recovery projection over the current context window.
            let mut window = runtime.store.list_context_window_events(&request.session).await?;
            let recovered = recovery_events(&window);
            if !recovered.is_empty() {
                debug!(session = %request.session, count = recovered.len(), "synthesizing recovery events");
            }
            for event in recovered {
                runtime.store.append_event(&request.session, event.clone()).await?;
                window.push(event.clone());
                yield event;
            }

            // Step 6: persist + emit the user-input event.
            let input_event = Event::new(request.session.clone(), request.input.clone());
            runtime.store.append_event(&request.session, input_event.clone()).await?;
            window.push(input_event.clone());
            yield input_event;

            // Step 7: auto-compaction if the watermark is crossed.
            let capacity = runtime.capacity_tokens(request.model.as_ref());
            match compact(&window, &runtime.config.compaction, Trigger::Auto, capacity, request.model.as_ref(), runtime.strategy.as_ref()).await {
                Ok(Some(event)) => {
                    info!(session = %request.session, "auto-compaction fired");
                    runtime.store.append_event(&request.session, event.clone()).await?;
                    yield event;
                    window = runtime.store.list_context_window_events(&request.session).await?;
                }
                Ok(None) | Err(_) => {}
            }

            // Step 8: the agent's history excludes lifecycle events.
            let mut history: Vec<Event> = window.iter().filter(|e| !e.is_lifecycle()).cloned().collect();

            // Step 9: mandatory core tools, then caller-supplied tools.
            let mut registry = ToolRegistry::new();
            registry.register(ReadTool::new(std::env::current_dir().unwrap_or_default()))?;
            for tool in request.tools.iter().cloned() {
                registry.register_arc(tool)?;
            }

            // Step 10: restore previously activated dynamic toolsets.
            let mut languages: BTreeSet<String> = request.auto_activate.iter().cloned().collect();
            for event in &window {
                if let Some(response) = &event.message.tool_response {
                    if runtime.config.activation_tool_names.contains(&response.name) {
                        if let Some(lang) = response.result.get("language").and_then(|v| v.as_str()) {
                            languages.insert(lang.to_string());
                        }
                    }
                }
            }
            if !languages.is_empty() {
                match &runtime.broker {
                    Some(broker) => {
                        let request_langs: Vec<String> = languages.into_iter().collect();
                        match broker.resolve(ActivateRequest { languages: request_langs }).await {
                            Ok(resolved) => {
                                for tool in resolved {
                                    if let Err(e) = registry.register_arc(tool) {
                                        debug!(session = %request.session, error = %e, "dynamic toolset tool shadowed by an existing registration");
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(session = %request.session, error = %e, "dynamic toolset broker resolution failed");
                            }
                        }
                    }
                    // No broker configured: silently ignored (§9, open question a).
                    None => {}
                }
            }

            let tools = Arc::new(registry);

            // Step 11: agent loop with at most one overflow retry.
            let mut overflow_retried = false;
            let run_error = 'agent: loop {
                let mut invocation = InvocationContext::new(
                    request.session.clone(),
                    request.model.clone(),
                    tools.clone(),
                    request.policies.clone(),
                )
                .with_emit_partial_events(runtime.config.emit_partial_events)
                .with_cancel(request.cancel.clone());
                if let Some(prompt) = &request.system_prompt {
                    invocation = invocation.with_system_prompt(prompt.clone());
                }

                let mut stream = agent_loop(invocation, history.clone());
                let mut turn_error: Option<Error> = None;
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(event) => {
                            let persist = !event.is_partial() || runtime.config.persist_partial_events;
                            if persist {
                                runtime.store.append_event(&request.session, event.clone()).await?;
                                window.push(event.clone());
                                if !event.is_partial() {
                                    history.push(event.clone());
                                }
                            }
                            yield event;
                        }
                        Err(e) => {
                            turn_error = Some(e);
                            break;
                        }
                    }
                }

                match turn_error {
                    None => break 'agent None,
                    Some(e) if e.is_overflow() && !overflow_retried => {
                        overflow_retried = true;
                        warn!(session = %request.session, "context overflow detected, forcing compaction and retrying once");
                        let capacity = runtime.capacity_tokens(request.model.as_ref());
                        match compact(&window, &runtime.config.compaction, Trigger::OverflowRecovery, capacity, request.model.as_ref(), runtime.strategy.as_ref()).await {
                            Ok(Some(event)) => {
                                runtime.store.append_event(&request.session, event.clone()).await?;
                                yield event;
                                window = runtime.store.list_context_window_events(&request.session).await?;
                                history = window.iter().filter(|e| !e.is_lifecycle()).cloned().collect();
                            }
                            Ok(None) | Err(_) => {
                                warn!(session = %request.session, "overflow recovery compaction produced nothing to summarize");
                            }
                        }
                        continue 'agent;
                    }
                    Some(e) => break 'agent Some(e),
                }
            };

            // Step 12: terminal lifecycle event.
            match run_error {
                None => {
                    info!(session = %request.session, "run completed");
                    let completed = lifecycle_event(request.session.clone(), LifecyclePayload::completed("run"));
                    runtime.store.append_event(&request.session, completed.clone()).await?;
                    yield completed;
                }
                Some(e) => {
                    let (status, error_code) = classify_error(&e);
                    warn!(session = %request.session, status = ?status, "run ended with error");
                    let payload = LifecyclePayload::terminal(status, "run", e.to_string(), error_code);
                    let terminal = lifecycle_event(request.session.clone(), payload);
                    runtime.store.append_event(&request.session, terminal.clone()).await?;
                    yield terminal;
                    Err(e)?;
                }
            }
        })
    }

    /// Forces a compaction pass independent of any run (§4.1). A no-op
    /// (`Ok(None)`) when the window has too few user turns to split.
    pub async fn compact(&self, request: CompactRequest) -> CoreResult<Option<Event>> {
        let window = self.store.list_context_window_events(&request.session).await?;
        if window.is_empty() {
            return Ok(None);
        }
        let capacity = self.capacity_tokens(request.model.as_ref());
        match compact(&window, &self.config.compaction, Trigger::Manual, capacity, request.model.as_ref(), self.strategy.as_ref()).await {
            Ok(Some(event)) => {
                self.store.append_event(&request.session, event.clone()).await?;
                Ok(Some(event))
            }
            Ok(None) | Err(_) => Ok(None),
        }
    }

    /// Pure read: estimates the current context window's token load
    /// against the configured (or caller-supplied) window size.
    pub async fn context_usage(&self, request: UsageRequest) -> CoreResult<UsageReport> {
        let window = self.store.list_context_window_events(&request.session).await?;
        let window_tokens = request
            .context_window_tokens
            .unwrap_or(self.config.compaction.default_context_window_tokens);
        let current_tokens = estimate_window_tokens(&window);
        let input_budget = agenticlaw_compaction::input_budget(
            window_tokens,
            self.config.compaction.reserve_output_tokens,
            self.config.compaction.safety_margin_tokens,
        );
        let ratio = if input_budget == 0 {
            0.0
        } else {
            current_tokens as f64 / input_budget as f64
        };
        Ok(UsageReport {
            current_tokens,
            window_tokens,
            input_budget,
            ratio,
            event_count: window.len(),
        })
    }

    /// Reads the latest lifecycle event in the current context window.
    pub async fn run_state(&self, request: RunStateRequest) -> CoreResult<RunStateReport> {
        let window = self.store.list_context_window_events(&request.session).await?;
        let Some(event) = window.iter().rev().find(|e| e.is_lifecycle()) else {
            return Ok(RunStateReport::default());
        };
        let Some(payload) = parse_lifecycle_payload(event) else {
            return Ok(RunStateReport::default());
        };
        Ok(RunStateReport {
            has_lifecycle: true,
            status: Some(payload.status),
            phase: Some(payload.phase),
            error: payload.error,
            error_code: payload.error_code,
            event_id: Some(event.id.clone()),
            updated_at: Some(event.time),
        })
    }
}

/// Error → lifecycle status mapping (§4.1's table, §7's taxonomy):
/// `ERR_APPROVAL_REQUIRED` → waiting_approval; `ERR_APPROVAL_ABORTED` or a
/// cancelled run → interrupted; anything else → failed.
fn classify_error(error: &Error) -> (LifecycleStatus, Option<String>) {
    let code = error.error_code().map(str::to_string);
    if error.is_cancelled() {
        return (LifecycleStatus::Interrupted, code);
    }
    match code.as_deref() {
        Some(c) if c == codes::APPROVAL_REQUIRED => (LifecycleStatus::WaitingApproval, code),
        Some(c) if c == codes::APPROVAL_ABORTED => (LifecycleStatus::Interrupted, code),
        _ => (LifecycleStatus::Failed, code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use agenticlaw_core::InMemorySessionStore;
    use agenticlaw_llm::{AlwaysOverflowModel, ScriptedModel, ScriptedTurn};

    fn session() -> SessionKey {
        SessionKey::new("app", "user", "s1")
    }

    fn runtime() -> Runtime {
        Runtime::new(Arc::new(InMemorySessionStore::new()), RuntimeConfig::default())
    }

    async fn collect(stream: RunEventStream) -> Result<Vec<Event>, Error> {
        let mut stream = stream;
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            events.push(item?);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn single_turn_no_tools_emits_four_events() {
        let rt = runtime();
        let model: Arc<dyn Model> = Arc::new(ScriptedModel::new("m", vec![ScriptedTurn::text("ok")]));
        let request = RunRequest::new(session(), "hi", model);
        let events = collect(rt.run(request)).await.unwrap();

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind(), Some("lifecycle"));
        assert_eq!(events[1].message.text, "hi");
        assert_eq!(events[2].message.text, "ok");
        assert_eq!(events[3].kind(), Some("lifecycle"));

        let stored = rt.store.list_events(&session()).await.unwrap();
        assert_eq!(stored.len(), 4);
    }

    #[tokio::test]
    async fn a_user_supplied_read_tool_is_rejected() {
        use agenticlaw_core::Capability;
        use agenticlaw_tools::ToolResult;
        use async_trait::async_trait;

        struct FakeRead;
        #[async_trait]
        impl Tool for FakeRead {
            fn name(&self) -> &str {
                "READ"
            }
            fn description(&self) -> &str {
                "shadows the built-in"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            fn capability(&self) -> Capability {
                Capability::default()
            }
            async fn run(&self, _args: serde_json::Value) -> Result<ToolResult, Error> {
                Ok(ToolResult::text(""))
            }
        }

        let rt = runtime();
        let model: Arc<dyn Model> = Arc::new(ScriptedModel::new("m", vec![ScriptedTurn::text("ok")]));
        let request = RunRequest::new(session(), "hi", model).with_tools(vec![Arc::new(FakeRead)]);
        let result = collect(rt.run(request)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn a_losing_single_flight_race_emits_nothing_but_the_error() {
        let rt = runtime();
        let _guard = rt.leases.try_acquire(&session()).unwrap();
        let model: Arc<dyn Model> = Arc::new(ScriptedModel::new("m", vec![ScriptedTurn::text("ok")]));
        let request = RunRequest::new(session(), "hi", model);
        let result = collect(rt.run(request)).await;
        assert!(matches!(result, Err(Error::SessionBusy)));
    }

    #[tokio::test]
    async fn a_second_consecutive_overflow_surfaces_as_failed() {
        // Let the agent loop's real backoff sleeps resolve instantly.
        tokio::time::pause();
        let rt = runtime();
        let model: Arc<dyn Model> = Arc::new(AlwaysOverflowModel { name: "m".into() });
        let request = RunRequest::new(session(), "hi", model);
        let events = collect(rt.run(request)).await;
        assert!(events.is_err());

        let state = rt.run_state(RunStateRequest { session: session() }).await.unwrap();
        assert_eq!(state.status, Some(LifecycleStatus::Failed));
    }

    #[tokio::test]
    async fn run_state_after_completion_points_at_the_final_lifecycle_event() {
        let rt = runtime();
        let model: Arc<dyn Model> = Arc::new(ScriptedModel::new("m", vec![ScriptedTurn::text("ok")]));
        let request = RunRequest::new(session(), "hi", model);
        let events = collect(rt.run(request)).await.unwrap();
        let last = events.last().unwrap();

        let state = rt.run_state(RunStateRequest { session: session() }).await.unwrap();
        assert_eq!(state.status, Some(LifecycleStatus::Completed));
        assert_eq!(state.event_id.as_deref(), Some(last.id.as_str()));
    }

    #[tokio::test]
    async fn context_usage_counts_the_current_window() {
        let rt = runtime();
        let model: Arc<dyn Model> = Arc::new(ScriptedModel::new("m", vec![ScriptedTurn::text("ok")]));
        let request = RunRequest::new(session(), "hi", model);
        collect(rt.run(request)).await.unwrap();

        let usage = rt
            .context_usage(UsageRequest {
                session: session(),
                context_window_tokens: None,
            })
            .await
            .unwrap();
        assert_eq!(usage.event_count, 4);
        assert!(usage.current_tokens > 0);
    }
}
