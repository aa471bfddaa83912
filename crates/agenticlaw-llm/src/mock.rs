//! A reference in-process `Model`. Non-canonical: host applications are
//! expected to supply their own model client. Useful for exercising the
//! agent loop and the runtime in tests without any network dependency.

use crate::provider::{GenerateStream, Model, ModelError, ModelResult};
use crate::types::{GenerateRequest, GenerateResponse};
use agenticlaw_core::{Message, Usage};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Scripted response handed out on the Nth call to `generate`, cycling back
/// to the first script entry once exhausted.
#[derive(Clone, Debug)]
pub struct ScriptedTurn {
    pub text: String,
    pub tool_calls: Vec<agenticlaw_core::ToolCall>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, id: impl Into<String>, args: serde_json::Value) -> Self {
        let args = args
            .as_object()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();
        Self {
            text: String::new(),
            tool_calls: vec![agenticlaw_core::ToolCall {
                id: id.into(),
                name: name.into(),
                args,
            }],
        }
    }
}

/// A deterministic model driven by a fixed script of turns, one per call.
/// Grounded on the reference provider shape the kernel needs for its own
/// tests: no network, no randomness, a single non-partial `GenerateResponse`
/// per call.
pub struct ScriptedModel {
    name: String,
    script: Vec<ScriptedTurn>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(name: impl Into<String>, script: Vec<ScriptedTurn>) -> Self {
        Self {
            name: name.into(),
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn context_window_tokens(&self) -> u64 {
        65536
    }

    async fn generate(
        &self,
        _request: GenerateRequest,
        cancel: Option<CancellationToken>,
    ) -> ModelResult<GenerateStream> {
        if let Some(cancel) = &cancel {
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
        }
        if self.script.is_empty() {
            return Err(ModelError::InvalidResponse("empty script".into()));
        }
        let idx = self.calls.fetch_add(1, Ordering::SeqCst) % self.script.len();
        let turn = self.script[idx].clone();
        let message = if turn.tool_calls.is_empty() {
            Message::assistant(turn.text)
        } else {
            Message::assistant_with_tool_calls(turn.text, turn.tool_calls)
        };
        let response = GenerateResponse {
            message,
            partial: false,
            turn_complete: true,
            provider: "scripted".to_string(),
            model: self.name.clone(),
            usage: Some(Usage {
                prompt_tokens: Some(0),
                completion_tokens: Some(0),
                total_tokens: Some(0),
            }),
        };
        Ok(Box::pin(futures::stream::once(async move { Ok(response) })))
    }
}

/// A model that always fails with a context-overflow-shaped error message,
/// useful for exercising the runtime's one-shot overflow retry in tests.
pub struct AlwaysOverflowModel {
    pub name: String,
}

#[async_trait]
impl Model for AlwaysOverflowModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _request: GenerateRequest,
        _cancel: Option<CancellationToken>,
    ) -> ModelResult<GenerateStream> {
        Ok(Box::pin(futures::stream::once(async {
            Err(ModelError::ContextOverflow("context length exceeded".into()))
        })))
    }
}
