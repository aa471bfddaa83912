//! The Dynamic Toolset Broker external collaborator (§6): per-language,
//! on-demand tool bundles resolved on request rather than registered
//! up front. Optional — a run with no broker configured simply never
//! activates anything beyond its caller-supplied and mandatory tools.

use crate::registry::Tool;
use agenticlaw_core::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// Languages (or other bundle keys) a run wants activated, gathered from
/// the caller's `auto_activate` list merged with whatever the context
/// window's activation-tool responses already named (§4.1 step 10).
#[derive(Clone, Debug, Default)]
pub struct ActivateRequest {
    pub languages: Vec<String>,
}

/// A resolved bundle of tools, ready to merge into the run's registry.
pub type ToolSet = Vec<Arc<dyn Tool>>;

/// Resolves on-demand tool bundles for a set of activated languages.
/// Implementations are supplied by the host application; the kernel ships
/// none.
#[async_trait]
pub trait DynamicToolsetBroker: Send + Sync {
    async fn resolve(&self, request: ActivateRequest) -> Result<ToolSet, Error>;
}
