//! Agent runtime kernel: a persisted, interruption-tolerant, policy-gated
//! model/tool execution loop.
//!
//! This crate is the orchestrator (component H): leasing, lifecycle events,
//! recovery projection, and compaction scheduling around the agent loop that
//! `agenticlaw-agent` implements. Everything else in the workspace —
//! session storage, the model/tool/policy contracts, compaction — is a
//! library this crate composes, not a thing it reimplements.

pub mod config;
pub mod lease;
pub mod runtime;

pub use config::RuntimeConfig;
pub use lease::{LeaseGuard, LeaseTable};
pub use runtime::{
    CompactRequest, Runtime, RunEventStream, RunRequest, RunStateReport, RunStateRequest,
    UsageReport, UsageRequest,
};

// Re-exported so a host can build a `Runtime` without depending on the
// sub-crates directly.
pub use agenticlaw_agent::{recovery_events, sanitize_message, sanitize_result};
pub use agenticlaw_core::{
    Error, Event, LifecycleStatus, Message, Result, Role, Session, SessionKey, SessionStore,
};
pub use agenticlaw_llm::Model;
pub use agenticlaw_policy::{Hook, PolicyChain};
pub use agenticlaw_tools::{DynamicToolsetBroker, Tool, ToolRegistry};

/// Installs a `tracing` subscriber reading `RUST_LOG` (falling back to
/// `agenticlaw=info`) with the standard formatted layer. Host binaries are
/// free to install their own subscriber instead; nothing in this crate
/// requires this particular one.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agenticlaw=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
