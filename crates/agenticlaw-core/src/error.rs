//! Error taxonomy for the runtime kernel.

use thiserror::Error;

/// Stable, opaque error-code identifiers. Never shown to end users as-is;
/// consumers match on these rather than on `Display` text.
pub mod codes {
    pub const APPROVAL_REQUIRED: &str = "ERR_APPROVAL_REQUIRED";
    pub const APPROVAL_ABORTED: &str = "ERR_APPROVAL_ABORTED";
    pub const SESSION_BUSY: &str = "ERR_SESSION_BUSY";
    pub const SANDBOX_UNSUPPORTED: &str = "ERR_SANDBOX_UNSUPPORTED";
    pub const SANDBOX_UNAVAILABLE: &str = "ERR_SANDBOX_UNAVAILABLE";
    pub const SANDBOX_COMMAND_TIMEOUT: &str = "ERR_SANDBOX_COMMAND_TIMEOUT";
    pub const SANDBOX_IDLE_TIMEOUT: &str = "ERR_SANDBOX_IDLE_TIMEOUT";
    pub const HOST_COMMAND_TIMEOUT: &str = "ERR_HOST_COMMAND_TIMEOUT";
    pub const HOST_IDLE_TIMEOUT: &str = "ERR_HOST_IDLE_TIMEOUT";
}

/// Substrings that mark a model error as a context-window overflow, per the
/// contract's stable keyword set. Shared by the runtime's overflow-retry
/// check and the compaction strategy's retry-on-overflow check.
pub const OVERFLOW_KEYWORDS: &[&str] = &[
    "context length",
    "context window",
    "prompt is too long",
    "too many tokens",
    "maximum context",
    "input is too long",
    "token limit",
    "max context",
];

pub fn looks_like_overflow(message: &str) -> bool {
    let lower = message.to_lowercase();
    OVERFLOW_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session busy: a run is already in progress for this session")]
    SessionBusy,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("policy error: {0}")]
    Policy(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{message}")]
    Coded {
        message: String,
        error_code: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn session_not_found(session: impl Into<String>) -> Self {
        Self::SessionNotFound(session.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool(message.into())
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy(message.into())
    }

    pub fn approval_required(reason: impl Into<String>) -> Self {
        Self::Coded {
            message: reason.into(),
            error_code: codes::APPROVAL_REQUIRED.to_string(),
        }
    }

    pub fn approval_aborted(reason: impl Into<String>) -> Self {
        Self::Coded {
            message: reason.into(),
            error_code: codes::APPROVAL_ABORTED.to_string(),
        }
    }

    pub fn coded(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self::Coded {
            message: message.into(),
            error_code: error_code.into(),
        }
    }

    /// The stable error code carried by this error, if any. Used by the
    /// runtime's error-to-lifecycle-status mapping table.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Error::SessionBusy => Some(codes::SESSION_BUSY),
            Error::Coded { error_code, .. } => Some(error_code.as_str()),
            _ => None,
        }
    }

    /// True when this error's message matches the stable context-overflow
    /// keyword set.
    pub fn is_overflow(&self) -> bool {
        looks_like_overflow(&self.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("json: {e}"))
    }
}
