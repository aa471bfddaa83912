//! The `Model` external-collaborator trait (§6).

use crate::types::{GenerateRequest, GenerateResponse};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context overflow: {0}")]
    ContextOverflow(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("cancelled")]
    Cancelled,
}

impl ModelError {
    pub fn is_overflow(&self) -> bool {
        matches!(self, ModelError::ContextOverflow(_))
            || agenticlaw_core::error::looks_like_overflow(&self.to_string())
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;

pub type GenerateStream = Pin<Box<dyn Stream<Item = ModelResult<GenerateResponse>> + Send>>;

/// A model, consumed by the agent loop. Implementations own whatever
/// network/client state they need; the kernel ships only a reference
/// in-memory implementation (`mock::EchoModel`) for exercising the loop
/// without a host application.
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// 0 if unknown to this model.
    fn context_window_tokens(&self) -> u64 {
        0
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: Option<CancellationToken>,
    ) -> ModelResult<GenerateStream>;
}
