//! Canonical data types shared by every component of the runtime kernel.
//!
//! A `Session` owns an ordered, append-only `Event` log. Everything the
//! runtime, the agent loop, and the policy chain reason about is built on
//! these few types; no component invents its own parallel representation of
//! a conversation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Version of the lifecycle payload shape. Bump only on a breaking change to
/// `meta.lifecycle`; consumers may assert on this to detect incompatible
/// runtimes.
pub const CONTRACT_VERSION: &str = "v1";

/// Identifies a session by the (app, user, session) triple. All three
/// components must be non-empty; callers are expected to validate this at
/// the boundary (see `agenticlaw_core::Error::validation`).
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.app_name.is_empty() && !self.user_id.is_empty() && !self.session_id.is_empty()
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// A session: an identity plus the event log owned by the store. The kernel
/// never deletes a session; it is created lazily on first `GetOrCreate`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Message role.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call emitted by the assistant, correlating a request with its
/// eventual `ToolResponse` via `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: HashMap<String, Value>,
}

/// The outcome of running a `ToolCall`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: String,
    pub name: String,
    pub result: HashMap<String, Value>,
}

/// Token usage reported by a model call, when available.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// One turn of conversation content. `tool_calls` is populated on assistant
/// messages that requested tool invocations; `tool_response` is populated on
/// tool messages that close out exactly one of those calls.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<ToolResponse>,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            tool_calls,
            ..Default::default()
        }
    }

    pub fn tool_response(response: ToolResponse) -> Self {
        Self {
            role: Role::Tool,
            tool_response: Some(response),
            ..Default::default()
        }
    }
}

/// An immutable, append-only record in a session's event log. Any apparent
/// "mutation" of the conversation is represented as a new event; nothing is
/// ever rewritten in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub session_id: SessionKey,
    pub time: chrono::DateTime<chrono::Utc>,
    pub message: Message,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl Event {
    pub fn new(session_id: SessionKey, message: Message) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            time: chrono::Utc::now(),
            message,
            meta: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.meta.get("partial"), Some(Value::Bool(true)))
    }

    pub fn kind(&self) -> Option<&str> {
        self.meta.get("kind").and_then(Value::as_str)
    }

    pub fn is_lifecycle(&self) -> bool {
        self.kind() == Some("lifecycle")
    }

    pub fn is_compaction(&self) -> bool {
        self.kind() == Some("compaction")
    }
}

/// A side-effect class a tool may exercise. Policies consult this to decide
/// whether a call needs gating.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    FileRead,
    FileWrite,
    Exec,
    Network,
}

/// How risky a tool's declared operations are, for policies that want a
/// coarse-grained signal without enumerating every operation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Unknown,
    Low,
    Medium,
    High,
}

impl Default for Risk {
    fn default() -> Self {
        Risk::Unknown
    }
}

/// A tool's declaration as surfaced by `Tool::declaration()` (§6): name,
/// description, and a JSON-Schema parameter shape. Distinct from the
/// model-facing `agenticlaw_llm::ToolDeclaration`, which the tools crate
/// derives from this one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A tool's self-declared capability, consulted by the policy chain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Capability {
    pub operations: Vec<Operation>,
    pub risk: Risk,
}

impl Capability {
    pub fn new(operations: impl Into<Vec<Operation>>, risk: Risk) -> Self {
        Self {
            operations: operations.into(),
            risk,
        }
    }

    pub fn has(&self, op: Operation) -> bool {
        self.operations.contains(&op)
    }
}

/// The policy chain's verdict on a tool call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
    RequireApproval,
}

/// A normalized decision produced by a policy hook. Unrecognized effect
/// strings (e.g. deserialized from an untrusted source) normalize to
/// `Allow`; `reason` is free-form.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    pub effect: Effect,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Well-known metadata keys placed on `Decision::metadata`.
pub mod decision_meta {
    pub const EXECUTION_ROUTE: &str = "execution_route";
    pub const FALLBACK_ON_COMMAND_NOT_FOUND: &str = "fallback_on_command_not_found";
}

/// Where a routed command ultimately executes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionRoute {
    Sandbox,
    Host,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            effect: Effect::Allow,
            reason: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            effect: Effect::Deny,
            reason: reason.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn require_approval(reason: impl Into<String>) -> Self {
        Self {
            effect: Effect::RequireApproval,
            reason: reason.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_route(mut self, route: ExecutionRoute) -> Self {
        let v = match route {
            ExecutionRoute::Sandbox => "sandbox",
            ExecutionRoute::Host => "host",
        };
        self.metadata
            .insert(decision_meta::EXECUTION_ROUTE.to_string(), Value::from(v));
        self
    }

    pub fn with_fallback_on_command_not_found(mut self, fallback: bool) -> Self {
        self.metadata.insert(
            decision_meta::FALLBACK_ON_COMMAND_NOT_FOUND.to_string(),
            Value::from(fallback),
        );
        self
    }

    /// Most-restrictive-wins merge of two decisions: deny > require_approval
    /// > allow. The winning decision's reason/metadata are kept.
    pub fn most_restrictive(self, other: Decision) -> Decision {
        fn rank(e: Effect) -> u8 {
            match e {
                Effect::Deny => 2,
                Effect::RequireApproval => 1,
                Effect::Allow => 0,
            }
        }
        if rank(other.effect) > rank(self.effect) {
            other
        } else {
            self
        }
    }
}

/// Status values carried by a lifecycle event's `meta.lifecycle.status`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Running,
    WaitingApproval,
    Interrupted,
    Failed,
    Completed,
}

impl LifecycleStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, LifecycleStatus::Running)
    }
}

/// The payload embedded in a lifecycle event's `meta.lifecycle` field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecyclePayload {
    pub status: LifecycleStatus,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LifecyclePayload {
    pub fn running(phase: impl Into<String>) -> Self {
        Self {
            status: LifecycleStatus::Running,
            phase: phase.into(),
            error: None,
            error_code: None,
        }
    }

    pub fn completed(phase: impl Into<String>) -> Self {
        Self {
            status: LifecycleStatus::Completed,
            phase: phase.into(),
            error: None,
            error_code: None,
        }
    }

    pub fn terminal(
        status: LifecycleStatus,
        phase: impl Into<String>,
        error: impl Into<String>,
        error_code: Option<String>,
    ) -> Self {
        Self {
            status,
            phase: phase.into(),
            error: Some(error.into()),
            error_code,
        }
    }
}

/// Builds the lifecycle `Event` for a given payload, stamping the fixed
/// `meta.kind`/`meta.contract_version` keys the contract requires.
pub fn lifecycle_event(session_id: SessionKey, payload: LifecyclePayload) -> Event {
    let mut event = Event::new(session_id, Message::system(""));
    event.meta.insert("kind".into(), Value::from("lifecycle"));
    event
        .meta
        .insert("contract_version".into(), Value::from(CONTRACT_VERSION));
    event.meta.insert(
        "lifecycle".into(),
        serde_json::to_value(&payload).expect("LifecyclePayload always serializes"),
    );
    event
}

/// Reads back the `meta.lifecycle` payload of an event, if present and well
/// formed.
pub fn parse_lifecycle_payload(event: &Event) -> Option<LifecyclePayload> {
    event
        .meta
        .get("lifecycle")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}
