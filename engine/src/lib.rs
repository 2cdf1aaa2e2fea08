//! Warden engine: tool protocol, dispatch, and context defenses.
//!
//! The dispatcher owns all per-turn state and passes it explicitly into
//! handlers; there is no ambient singleton. Handlers never touch the
//! filesystem or spawn processes except through the validators handed to
//! them in [`tools::ToolCtx`].

pub mod anchor;
pub mod arbiter;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod exec;
pub mod protocol;
pub mod registry;
pub mod tools;
pub mod turn;
pub mod undo;

pub use anchor::Anchorer;
pub use arbiter::{ApprovalPrompt, ApprovalRequest, PermissionArbiter, PermissionMode};
pub use audit::{AuditEvent, AuditLog};
pub use config::RuntimeConfig;
pub use dispatch::Dispatcher;
pub use registry::{ToolDescriptor, ToolHandler, ToolRegistry};
pub use turn::{TrustRegistry, TurnContext};

use std::time::Duration;

use warden_sandbox::SandboxError;
use warden_types::ErrorKind;

/// Error type shared by tool handlers and the dispatcher.
///
/// Reported, not raised: every variant maps onto a canonical error kind and
/// becomes an `ok=false` result reinjected into the model.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("bad tool args: {message}")]
    BadArgs { message: String },
    #[error("permission denied for tool: {tool}")]
    PermissionDenied { tool: String },
    #[error("untrusted content was read this turn; refusing action tool: {tool}")]
    ProvenanceBlocked { tool: String },
    #[error("pattern '{needle}' matched {count} times; pass occurrence to disambiguate")]
    AmbiguousMatch { needle: String, count: usize },
    #[error("not found: {what}")]
    NotFound { what: String },
    #[error("tool timed out: {tool} after {elapsed:?}")]
    Timeout { tool: String, elapsed: Duration },
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error("tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
}

impl ToolError {
    /// Canonical kind surfaced in the framed result.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Sandbox(err) => err.kind(),
            ToolError::BadArgs { .. } | ToolError::UnknownTool { .. } => ErrorKind::ParseError,
            ToolError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            ToolError::ProvenanceBlocked { .. } => ErrorKind::ProvenanceBlocked,
            ToolError::AmbiguousMatch { .. } => ErrorKind::AmbiguousMatch,
            ToolError::NotFound { .. } => ErrorKind::NotFound,
            ToolError::Timeout { .. } => ErrorKind::TimedOut,
            ToolError::DuplicateTool { .. } | ToolError::ExecutionFailed { .. } => {
                ErrorKind::InternalError
            }
        }
    }
}
