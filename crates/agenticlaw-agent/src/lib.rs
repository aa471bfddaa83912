//! Agent loop and turn-local machinery (components F and G): the model/tool
//! execution cycle that drives one session's conversation forward, plus the
//! sanitization and recovery-projection steps it depends on. The runtime
//! orchestrator (the workspace-root `agenticlaw` package) owns everything
//! above a single turn: leasing, persistence, compaction scheduling, and
//! lifecycle events.

pub mod invocation;
pub mod recovery;
pub mod sanitize;
pub mod turn;

pub use invocation::{AgentEventStream, InvocationContext, DECISION_CONTEXT_KEY};
pub use recovery::recovery_events;
pub use sanitize::{sanitize_message, sanitize_result, sanitize_value};
pub use turn::agent_loop;
