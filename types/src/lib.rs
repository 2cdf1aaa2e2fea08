//! Core domain types for Warden.
//!
//! Everything here is plain data: no IO, no async, no policy. The sandbox
//! and engine crates build on these types; keeping them dependency-light
//! means the whole defense stack shares one vocabulary for tool calls,
//! tool results, and canonical error kinds.

mod call;
mod result;

pub use call::{ArgValue, ToolCall};
pub use result::{FRAME_PAYLOAD_LIMIT, ToolResult, frame_result};

use serde::{Deserialize, Serialize};

/// Capability class of a registered tool.
///
/// Classification is a field on the descriptor, not a trait hierarchy:
/// the dispatcher switches on it for provenance gating and anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Returns content originating outside the trusted boundary.
    Read,
    /// Mutates files inside the sandbox.
    Write,
    /// Mutates filesystem state, spawns processes, or touches git history.
    Action,
    /// Session-level operations (undo, trust management).
    Meta,
}

impl Capability {
    /// Action-class calls are refused while the turn is tainted.
    #[must_use]
    pub fn is_action(self) -> bool {
        matches!(self, Capability::Action)
    }

    /// Read-class output is scrubbed and anchored before reinjection.
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Capability::Read)
    }
}

/// Canonical error kinds surfaced in tool results.
///
/// These are the only failure identities the model ever sees; every
/// internal error type maps onto one of them at the dispatcher boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("parse_error")]
    ParseError,
    #[error("permission_denied")]
    PermissionDenied,
    #[error("provenance_blocked")]
    ProvenanceBlocked,
    #[error("outside_sandbox")]
    OutsideSandbox,
    #[error("protected")]
    Protected,
    #[error("blocked_extension")]
    BlockedExtension,
    #[error("non_ascii_command")]
    NonAsciiCommand,
    #[error("blocked_metacharacter")]
    BlockedMetacharacter,
    #[error("command_not_allowed")]
    CommandNotAllowed,
    #[error("inline_interpreter")]
    InlineInterpreter,
    #[error("ambiguous_match")]
    AmbiguousMatch,
    #[error("not_found")]
    NotFound,
    #[error("timed_out")]
    TimedOut,
    #[error("output_truncated")]
    OutputTruncated,
    #[error("integrity_failure")]
    IntegrityFailure,
    #[error("internal_error")]
    InternalError,
}

impl ErrorKind {
    /// Wire name, identical to the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::ProvenanceBlocked => "provenance_blocked",
            ErrorKind::OutsideSandbox => "outside_sandbox",
            ErrorKind::Protected => "protected",
            ErrorKind::BlockedExtension => "blocked_extension",
            ErrorKind::NonAsciiCommand => "non_ascii_command",
            ErrorKind::BlockedMetacharacter => "blocked_metacharacter",
            ErrorKind::CommandNotAllowed => "command_not_allowed",
            ErrorKind::InlineInterpreter => "inline_interpreter",
            ErrorKind::AmbiguousMatch => "ambiguous_match",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::OutputTruncated => "output_truncated",
            ErrorKind::IntegrityFailure => "integrity_failure",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BlockedMetacharacter).unwrap();
        assert_eq!(json, "\"blocked_metacharacter\"");
    }

    #[test]
    fn error_kind_as_str_matches_serde() {
        for kind in [
            ErrorKind::ParseError,
            ErrorKind::ProvenanceBlocked,
            ErrorKind::OutsideSandbox,
            ErrorKind::InlineInterpreter,
            ErrorKind::IntegrityFailure,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn capability_classification() {
        assert!(Capability::Action.is_action());
        assert!(!Capability::Read.is_action());
        assert!(Capability::Read.is_read());
        assert!(!Capability::Meta.is_read());
    }
}
