//! Defaulted runtime configuration (§4.1 ambient additions). Mirrors
//! `agenticlaw_compaction::CompactionConfig`'s `#[serde(default)]`-per-field
//! pattern so a host can deserialize a partial TOML/JSON override and still
//! get sane defaults for everything it left out.

use agenticlaw_compaction::CompactionConfig;
use serde::{Deserialize, Serialize};

fn default_read_tool_name() -> String {
    "READ".to_string()
}

/// Knobs the runtime orchestrator (component H) resolves before every
/// `Run`. Nothing here is required: `RuntimeConfig::default()` is directly
/// usable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Persist `meta.partial = true` fragments to the store (I4). Off by
    /// default: streaming fragments are ephemeral unless a host opts in.
    pub persist_partial_events: bool,
    /// Turn streaming partial fragments carrying reasoning/text into
    /// `meta.partial = true` events at all (§4.2 step 3). Off by default.
    pub emit_partial_events: bool,
    pub compaction: CompactionConfig,
    /// Name reserved for the mandatory built-in read tool; a caller-
    /// supplied tool under this name is rejected at run setup (§4.1 step 9).
    #[serde(default = "default_read_tool_name")]
    pub read_tool_name: String,
    /// Tool names whose `tool_response.result.language` values are scanned
    /// out of the context window to restore previously activated dynamic
    /// toolsets (§4.1 step 10).
    pub activation_tool_names: Vec<String>,
    /// Accepted but ignored (§8 boundary behavior): a run is only bounded
    /// by the model eventually producing zero tool_calls, context
    /// cancellation, or the duplicate-call guard.
    pub max_steps: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            persist_partial_events: false,
            emit_partial_events: false,
            compaction: CompactionConfig::default(),
            read_tool_name: default_read_tool_name(),
            activation_tool_names: Vec::new(),
            max_steps: None,
        }
    }
}
