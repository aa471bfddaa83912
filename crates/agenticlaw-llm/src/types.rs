//! Request/response types for the external Model collaborator (§6).
//!
//! These types wrap `agenticlaw_core::Message` rather than duplicating a
//! provider-specific message shape — the kernel is deliberately
//! provider-agnostic, so nothing here names a concrete model id or wire
//! format.

use agenticlaw_core::{Message, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool declaration surfaced to the model, mirroring `Tool::declaration()`
/// from `agenticlaw-tools` without creating a dependency cycle on that
/// crate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Reasoning/"thinking" configuration passed through to models that support
/// an extended-thinking channel. Absent or zero means disabled.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub budget_tokens: u32,
}

/// A request to `Model::generate`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tool_declarations: Vec<ToolDeclaration>,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

fn default_stream() -> bool {
    true
}

impl GenerateRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tool_declarations: Vec::new(),
            stream: true,
            reasoning: ReasoningConfig::default(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tool_declarations = tools;
        self
    }
}

/// One element of a model's lazy response sequence. `partial` fragments may
/// be surfaced for streaming observers; the final response for a turn has
/// `turn_complete = true` and the full assistant `message`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub message: Message,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub turn_complete: bool,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}
