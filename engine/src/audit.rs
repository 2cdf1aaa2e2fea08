//! Append-only structured audit sink.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use warden_types::ErrorKind;

/// One audit record, serialized as a JSON line.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(event: &'static str) -> Self {
        Self {
            at: Utc::now(),
            event,
            tool: None,
            call_index: None,
            outcome: None,
            error_kind: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn tool(mut self, tool: impl Into<String>, call_index: u32) -> Self {
        self.tool = Some(tool.into());
        self.call_index = Some(call_index);
        self
    }

    #[must_use]
    pub fn outcome(mut self, outcome: &'static str) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn error(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Append-only JSONL sink behind a single writer.
///
/// Emission failures are logged and swallowed; a broken audit disk must not
/// take the session down, but every failure is visible in the trace log.
pub struct AuditLog {
    writer: Option<Mutex<Box<dyn Write + Send>>>,
}

impl AuditLog {
    /// Open (or create) the audit file in append mode.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Some(Mutex::new(Box::new(file))),
        })
    }

    /// A sink that drops everything; used by tests and `--verify-only` boots.
    #[must_use]
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn emit(&self, event: &AuditEvent) {
        let Some(writer) = &self.writer else {
            return;
        };
        let Ok(line) = serde_json::to_string(event) else {
            tracing::warn!("audit event failed to serialize");
            return;
        };
        let mut guard = match writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(guard, "{line}") {
            tracing::warn!(error = %e, "audit write failed");
        }
    }
}
