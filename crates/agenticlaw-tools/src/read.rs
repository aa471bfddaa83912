//! The mandatory built-in `READ` tool (§4.1 step 9). Every run gets one of
//! these injected under the configured name (default `"READ"`); a
//! caller-supplied tool of that name is rejected at run setup.

use crate::registry::{Tool, ToolResult};
use agenticlaw_core::{Capability, Error, Operation, Risk};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct ReadTool {
    workspace_root: PathBuf,
}

impl ReadTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }

    /// Normalizes a caller-supplied path the same way `RequireReadBeforeWrite`
    /// does: absolute, `~`-expanded, then cleaned. Exposed so policy hooks
    /// and tests can assert the two normalize identically.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            dirs::home_dir().unwrap_or_default().join(rest)
        } else if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace_root.join(p)
        };
        expanded.canonicalize().unwrap_or(expanded)
    }
}

#[async_trait::async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "READ"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns numbered lines. Use offset/limit for large files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default 2000)"
                }
            },
            "required": ["path"]
        })
    }

    fn capability(&self) -> Capability {
        Capability::new(vec![Operation::FileRead], Risk::Low)
    }

    async fn run(&self, args: Value) -> Result<ToolResult, Error> {
        let path = args
            .get("path")
            .or_else(|| args.get("file_path"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::tool("missing required parameter: path"))?;

        let resolved = self.resolve_path(path);

        let content = fs::read_to_string(&resolved)
            .await
            .map_err(|e| Error::tool(format!("failed to read file: {e}")))?;

        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(1) as usize;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(2000) as usize;

        let lines: Vec<&str> = content.lines().collect();
        let start = offset.saturating_sub(1).min(lines.len());
        let end = (start + limit).min(lines.len());

        let result: Vec<String> = lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6}\t{}", start + i + 1, line))
            .collect();

        debug!(path, lines = end - start, offset, "read");
        Ok(ToolResult::text(result.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_with_numbered_lines() {
        let dir = tempfile_dir();
        let file = dir.join("a.txt");
        tokio::fs::write(&file, "one\ntwo\nthree\n").await.unwrap();
        let tool = ReadTool::new(&dir);
        let result = tool
            .run(json!({ "path": "a.txt" }))
            .await
            .unwrap()
            .to_content_string();
        assert!(result.contains("1\tone"));
        assert!(result.contains("3\tthree"));
    }

    #[tokio::test]
    async fn missing_path_errors() {
        let dir = tempfile_dir();
        let tool = ReadTool::new(&dir);
        let result = tool.run(json!({})).await;
        assert!(result.is_err());
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("agenticlaw-read-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
