//! The compaction subsystem (component E): folds older events into a
//! summary `Event` so a session's context window stays within budget.

pub mod compactor;
pub mod config;
pub mod strategy;
pub mod tokens;

pub use compactor::{compact, NotCompacted};
pub use config::{CompactionConfig, Trigger};
pub use strategy::{MapReduceStrategy, Strategy};
pub use tokens::{estimate_tokens, event_tokens, input_budget, window_tokens};
