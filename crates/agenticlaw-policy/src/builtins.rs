//! Built-in hooks whose behavior is part of the contract (§4.3): the
//! permissive default, the read-before-write gate, and command-execution
//! routing with obfuscation hardening.

use crate::hook::{Hook, ToolInput};
use agenticlaw_core::{Decision, Error, Event, Operation};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A read-only view onto the current context window, supplied by the
/// runtime/agent loop so hooks that need conversation history (like
/// `RequireReadBeforeWrite`) don't have to be threaded through the agent
/// loop's own state by hand.
pub trait WindowView: Send + Sync {
    fn window_events(&self) -> Vec<Event>;
}

/// A static window, useful for tests and for callers that snapshot the
/// window once per run rather than tracking it live.
pub struct StaticWindow(pub Vec<Event>);

impl WindowView for StaticWindow {
    fn window_events(&self) -> Vec<Event> {
        self.0.clone()
    }
}

/// Pass-through hook: `effect = allow` unconditionally. The chain's
/// identity element; a chain with no hooks behaves identically to a chain
/// containing only this one.
pub struct DefaultAllow;

#[async_trait]
impl Hook for DefaultAllow {
    fn name(&self) -> &str {
        "DefaultAllow"
    }

    async fn before_tool(&self, mut input: ToolInput) -> Result<ToolInput, Error> {
        input.decision = input.decision.most_restrictive(Decision::allow());
        Ok(input)
    }
}

/// Denies a `file_write` call unless a prior tool_response from the
/// configured read tool, in the current window, carries a matching `path`.
/// Paths are normalized (absolute, `~`-expanded, lexically cleaned) before
/// comparison so `./a.txt` and `/workspace/a.txt` match when run from
/// `/workspace`.
pub struct RequireReadBeforeWrite {
    read_tool_name: String,
    workspace_root: PathBuf,
    window: Arc<dyn WindowView>,
}

impl RequireReadBeforeWrite {
    pub fn new(
        read_tool_name: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
        window: Arc<dyn WindowView>,
    ) -> Self {
        Self {
            read_tool_name: read_tool_name.into(),
            workspace_root: workspace_root.into(),
            window,
        }
    }

    fn read_paths(&self) -> Vec<PathBuf> {
        self.window
            .window_events()
            .into_iter()
            .filter_map(|e| e.message.tool_response)
            .filter(|r| r.name == self.read_tool_name)
            .filter_map(|r| r.result.get("path").and_then(|v| v.as_str().map(str::to_string)))
            .map(|p| normalize_path(&p, &self.workspace_root))
            .collect()
    }
}

#[async_trait]
impl Hook for RequireReadBeforeWrite {
    fn name(&self) -> &str {
        "RequireReadBeforeWrite"
    }

    async fn before_tool(&self, mut input: ToolInput) -> Result<ToolInput, Error> {
        if !input.capability.has(Operation::FileWrite) {
            return Ok(input);
        }
        let target = input
            .call
            .args
            .get("path")
            .or_else(|| input.call.args.get("file_path"))
            .and_then(|v| v.as_str());
        let Some(target) = target else {
            return Ok(input);
        };
        let normalized = normalize_path(target, &self.workspace_root);
        let satisfied = self.read_paths().iter().any(|p| *p == normalized);
        if !satisfied {
            input.decision = input.decision.most_restrictive(Decision::deny(format!(
                "write to {} was not preceded by a {} of that path",
                target, self.read_tool_name
            )));
        }
        Ok(input)
    }
}

/// Lexical normalization: `~`-expand, resolve relative to `workspace_root`,
/// then clean `.`/`..`/redundant separators without touching the
/// filesystem (the path may not exist yet for a write).
pub fn normalize_path(path: &str, workspace_root: &Path) -> PathBuf {
    let expanded = if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir().unwrap_or_default().join(rest)
    } else {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            workspace_root.join(p)
        }
    };
    clean(&expanded)
}

/// Lexical path cleaning equivalent to Go's `filepath.Clean`: collapses
/// `.` components and resolves `..` against preceding components without
/// touching the filesystem.
fn clean(path: &Path) -> PathBuf {
    use std::path::Component::*;
    let mut out: Vec<std::path::Component> = Vec::new();
    let mut rooted = false;
    for component in path.components() {
        match component {
            CurDir => {}
            RootDir | Prefix(_) => {
                rooted = true;
                out.push(component);
            }
            ParentDir => match out.last() {
                Some(Normal(_)) => {
                    out.pop();
                }
                Some(RootDir) | Some(Prefix(_)) => {}
                _ if rooted => {}
                _ => out.push(component),
            },
            Normal(_) => out.push(component),
        }
    }
    out.into_iter().collect()
}

/// Where a routed command ultimately executes, and why, produced by the
/// external `ExecutionEnvironment` collaborator (§6).
#[derive(Clone, Debug)]
pub enum RouteOutcome {
    Sandbox,
    HostApproval { reason: String },
    Deny { reason: String },
}

/// Consulted by `RouteCommandExecution` to decide where a shell-like tool
/// call should run. Implementations are supplied by the host application;
/// the kernel ships no concrete sandbox.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    async fn decide_route(&self, command: &str, sandbox_permission: bool) -> RouteOutcome;
}

/// Routes shell-like tool calls through an `ExecutionEnvironment`, folding
/// in obfuscation detection ahead of that consultation: an obfuscated
/// command is denied before the execution environment is even asked (§4.3).
pub struct RouteCommandExecution {
    shell_tool_name: String,
    sandbox_permission: bool,
    env: Arc<dyn ExecutionEnvironment>,
}

impl RouteCommandExecution {
    pub fn new(
        shell_tool_name: impl Into<String>,
        sandbox_permission: bool,
        env: Arc<dyn ExecutionEnvironment>,
    ) -> Self {
        Self {
            shell_tool_name: shell_tool_name.into(),
            sandbox_permission,
            env,
        }
    }
}

#[async_trait]
impl Hook for RouteCommandExecution {
    fn name(&self) -> &str {
        "RouteCommandExecution"
    }

    async fn before_tool(&self, mut input: ToolInput) -> Result<ToolInput, Error> {
        if input.call.name != self.shell_tool_name {
            return Ok(input);
        }
        let Some(command) = input.call.args.get("command").and_then(|v| v.as_str()) else {
            return Ok(input);
        };

        if detect_obfuscation(command) {
            input.decision = input
                .decision
                .most_restrictive(Decision::deny("command matched an obfuscation heuristic"));
            return Ok(input);
        }

        let decision = match self.env.decide_route(command, self.sandbox_permission).await {
            RouteOutcome::Sandbox => Decision::allow()
                .with_route(agenticlaw_core::ExecutionRoute::Sandbox)
                .with_fallback_on_command_not_found(true),
            RouteOutcome::HostApproval { reason } => {
                Decision::require_approval(reason).with_route(agenticlaw_core::ExecutionRoute::Host)
            }
            RouteOutcome::Deny { reason } => Decision::deny(reason),
        };
        input.decision = input.decision.most_restrictive(decision);
        Ok(input)
    }
}

/// Heuristics for shell commands that try to smuggle a denied operation
/// past a literal pattern match: base64-to-shell pipelines, `eval`, `bash
/// -c` wrappers, variable-assignment execution, here-strings/here-docs, and
/// `xargs` piped to a shell. Grounded on the same obfuscation surface a
/// command-execution policy needs to cover; supplementary hardening beyond
/// what §4.3 sketches.
pub fn detect_obfuscation(command: &str) -> bool {
    let lower = command.to_lowercase();

    if lower.contains("base64")
        && (lower.contains("| bash") || lower.contains("| sh") || lower.contains("| eval"))
    {
        return true;
    }
    if (lower.contains("$(") || lower.contains('`'))
        && (lower.contains("rm ")
            || lower.contains("chmod")
            || lower.contains("dd ")
            || lower.contains("curl")
            || lower.contains("wget")
            || lower.contains("nc "))
    {
        return true;
    }
    if lower.contains("ld_preload") || lower.contains("ld_library_path") {
        return true;
    }
    if lower.contains("/proc/self/exe") || lower.contains("/proc/self/fd") {
        return true;
    }
    if Regex::new(r"[A-Za-z_]\w*=\S+\s*;.*\$")
        .map(|re| re.is_match(&lower))
        .unwrap_or(false)
    {
        return true;
    }
    if Regex::new(r"(?:^|\s|;)(bash|sh|dash)\s+-c\s")
        .map(|re| re.is_match(&lower))
        .unwrap_or(false)
    {
        return true;
    }
    if Regex::new(r"(?:^|\s|;)eval\s")
        .map(|re| re.is_match(&lower))
        .unwrap_or(false)
    {
        return true;
    }
    if Regex::new(r"(?:bash|sh|dash)\s+<<<")
        .map(|re| re.is_match(&lower))
        .unwrap_or(false)
    {
        return true;
    }
    if Regex::new(r"(?:bash|sh|dash)\s+<<\s*\w")
        .map(|re| re.is_match(&lower))
        .unwrap_or(false)
    {
        return true;
    }
    if lower.contains("xargs") && (lower.contains("sh") || lower.contains("bash")) {
        return true;
    }
    false
}
