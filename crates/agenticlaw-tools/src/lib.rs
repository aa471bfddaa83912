//! The `Tool` & `Capability` contract (component C): trait, registry,
//! output truncation, and one reference built-in tool.

pub mod broker;
pub mod read;
pub mod registry;

pub use broker::{ActivateRequest, DynamicToolsetBroker, ToolSet};
pub use read::ReadTool;
pub use registry::{truncate_output, Tool, ToolRegistry, ToolResult, MAX_TOOL_RESULT_CHARS};
