//! The `Tool` external-collaborator trait (§6) and its registry (component
//! C).

use agenticlaw_core::{Capability, Error, ToolDeclaration};
use agenticlaw_llm::ToolDeclaration as LlmToolDeclaration;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Output produced by running a tool.
#[derive(Clone, Debug)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn to_content_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => serde_json::to_string_pretty(v).unwrap_or_default(),
            Self::Error(e) => e.clone(),
        }
    }
}

/// Truncates large tool output so a single result can't blow out the model
/// context on its own. Mirrors the teacher's tool-result truncation
/// constant, generalized into a reusable helper (§4.2 step 8 / §4.C).
pub const MAX_TOOL_RESULT_CHARS: usize = 50_000;

pub fn truncate_output(s: &str) -> String {
    if s.len() <= MAX_TOOL_RESULT_CHARS {
        return s.to_string();
    }
    let mut truncated = s.chars().take(MAX_TOOL_RESULT_CHARS).collect::<String>();
    truncated.push_str(&format!(
        "\n... [truncated, {} bytes total]",
        s.len()
    ));
    truncated
}

/// Declaration/name/description/schema plus an optional self-declared
/// `Capability` consulted by the policy chain. Implement this trait to add
/// a tool to the runtime; the kernel ships only `ReadTool` as a reference.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (e.g. "READ").
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> Value;

    /// Self-declared side-effect class. Tools that don't override this
    /// default to `risk=unknown` with no declared operations, per §4.2
    /// step 8.
    fn capability(&self) -> Capability {
        Capability::default()
    }

    async fn run(&self, args: Value) -> Result<ToolResult, Error>;

    /// Run with cancellation support. Default: race `run` against
    /// cancellation. Tools that own a child process or a long-lived
    /// connection should override this to tear it down on cancellation.
    async fn run_cancellable(
        &self,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, Error> {
        tokio::select! {
            result = self.run(args) => result,
            _ = cancel.cancelled() => Ok(ToolResult::text("[cancelled]")),
        }
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    fn to_llm_declaration(&self) -> LlmToolDeclaration {
        LlmToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.input_schema(),
        }
    }
}

/// Name → tool lookup, with the duplicate-registration rejection the
/// runtime relies on when injecting the mandatory `READ` tool (§4.1 step 9).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, failing if a tool with the same name already
    /// exists. Distinct from `insert`/`register_overwrite`: the runtime
    /// needs a fail-fast registration path for mandatory core tools.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), Error> {
        self.register_arc(Arc::new(tool))
    }

    /// Same as `register`, for a tool already behind an `Arc` — the shape
    /// the runtime receives caller-supplied and broker-resolved tools in,
    /// since both may be shared across runs.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), Error> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::validation(format!(
                "duplicate tool registration: {name}"
            )));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(|t| t.declaration()).collect()
    }

    pub fn llm_declarations(&self) -> Vec<LlmToolDeclaration> {
        self.tools.values().map(|t| t.to_llm_declaration()).collect()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub async fn run_cancellable(
        &self,
        name: &str,
        args: Value,
        cancel: CancellationToken,
    ) -> Result<ToolResult, Error> {
        match self.tools.get(name) {
            Some(tool) => tool.run_cancellable(args, cancel).await,
            None => Err(Error::tool(format!("tool not found: {name}"))),
        }
    }
}
