//! Defaulted compaction configuration (§4.5). Every field has a default
//! matching the contract exactly; `serde` lets a host deserialize overrides
//! from TOML/JSON while keeping the same defaults when a field is omitted.

use serde::{Deserialize, Serialize};

fn default_watermark_ratio() -> f64 {
    0.7
}
fn default_context_window_tokens() -> u64 {
    65536
}
fn default_reserve_output_tokens() -> u64 {
    4096
}
fn default_safety_margin_tokens() -> u64 {
    1024
}
fn default_preserve_recent_turns() -> usize {
    2
}
fn default_summary_chunk_tokens() -> u64 {
    6000
}
fn default_max_model_summary_retries() -> u32 {
    3
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    #[serde(default = "default_watermark_ratio")]
    pub watermark_ratio: f64,
    #[serde(default = "default_context_window_tokens")]
    pub default_context_window_tokens: u64,
    #[serde(default = "default_reserve_output_tokens")]
    pub reserve_output_tokens: u64,
    #[serde(default = "default_safety_margin_tokens")]
    pub safety_margin_tokens: u64,
    #[serde(default = "default_preserve_recent_turns")]
    pub preserve_recent_turns: usize,
    #[serde(default = "default_summary_chunk_tokens")]
    pub summary_chunk_tokens: u64,
    #[serde(default = "default_max_model_summary_retries")]
    pub max_model_summary_retries: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            watermark_ratio: default_watermark_ratio(),
            default_context_window_tokens: default_context_window_tokens(),
            reserve_output_tokens: default_reserve_output_tokens(),
            safety_margin_tokens: default_safety_margin_tokens(),
            preserve_recent_turns: default_preserve_recent_turns(),
            summary_chunk_tokens: default_summary_chunk_tokens(),
            max_model_summary_retries: default_max_model_summary_retries(),
        }
    }
}

impl CompactionConfig {
    /// Clamps `watermark_ratio` into `[0.5, 0.9]` regardless of what a
    /// deserialized config supplied; called once after loading.
    pub fn normalized(mut self) -> Self {
        self.watermark_ratio = self.watermark_ratio.clamp(0.5, 0.9);
        self
    }
}

/// Why a compaction pass ran.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Auto,
    Manual,
    OverflowRecovery,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Auto => "auto",
            Trigger::Manual => "manual",
            Trigger::OverflowRecovery => "overflow_recovery",
        }
    }
}
