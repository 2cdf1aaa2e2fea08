//! Built-in tool handlers and the per-call context.

pub mod file;
pub mod git;
pub mod search;
pub mod shell;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use warden_integrity::BinaryPaths;
use warden_sandbox::{CommandSandbox, EnvPolicy, PathValidator};
use warden_types::ToolCall;

use crate::exec::ExecLimits;
use crate::registry::ToolRegistry;
use crate::turn::TrustRegistry;
use crate::undo::BackupStore;
use crate::ToolError;

/// Everything a handler may touch.
///
/// Handlers never reach the filesystem or spawn processes except through
/// the validators and executor limits carried here.
pub struct ToolCtx {
    pub paths: PathValidator,
    pub command_sandbox: CommandSandbox,
    pub env: EnvPolicy,
    pub binaries: BinaryPaths,
    pub limits: ExecLimits,
    pub max_read_lines: usize,
    pub working_dir: PathBuf,
    pub trust: TrustRegistry,
    pub backups: Arc<Mutex<BackupStore>>,
}

impl ToolCtx {
    /// Sanitized environment for a child process.
    #[must_use]
    pub fn child_env(&self) -> Vec<(String, String)> {
        let raw: Vec<(String, String)> = std::env::vars().collect();
        self.env.sanitize(&raw)
    }

    /// Render a sandbox-root-relative form of a canonical path for output.
    #[must_use]
    pub fn display_path(&self, canonical: &std::path::Path) -> String {
        for root in &self.paths.policy().allowed_dirs {
            if let Ok(rel) = canonical.strip_prefix(root) {
                return rel.to_string_lossy().into_owned();
            }
        }
        canonical.to_string_lossy().into_owned()
    }
}

/// What a handler hands back to the dispatcher.
#[derive(Debug)]
pub struct ToolOutput {
    pub data: serde_json::Value,
    /// `Some` for read-class content: the dispatcher anchors it under this
    /// origin label before it can reach the model.
    pub origin: Option<String>,
    /// Sets the turn's provenance flag on success.
    pub untrusted: bool,
    pub truncated: bool,
    pub bytes_read: Option<u64>,
}

impl ToolOutput {
    #[must_use]
    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data,
            origin: None,
            untrusted: false,
            truncated: false,
            bytes_read: None,
        }
    }

    /// Read-class content with its origin label.
    #[must_use]
    pub fn read(content: String, origin: impl Into<String>, untrusted: bool) -> Self {
        Self {
            data: serde_json::Value::String(content),
            origin: Some(origin.into()),
            untrusted,
            truncated: false,
            bytes_read: None,
        }
    }

    #[must_use]
    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }

    #[must_use]
    pub fn with_bytes_read(mut self, bytes: u64) -> Self {
        self.bytes_read = Some(bytes);
        self
    }
}

/// Fetch an argument by position or keyword.
pub fn required_str(call: &ToolCall, index: usize, name: &str) -> Result<String, ToolError> {
    optional_str(call, index, name).ok_or_else(|| ToolError::BadArgs {
        message: format!("{}: missing required argument '{name}'", call.name),
    })
}

#[must_use]
pub fn optional_str(call: &ToolCall, index: usize, name: &str) -> Option<String> {
    call.positional_arg(index)
        .or_else(|| call.keyword_arg(name))
        .map(|arg| arg.value.clone())
}

pub fn optional_usize(
    call: &ToolCall,
    index: usize,
    name: &str,
) -> Result<Option<usize>, ToolError> {
    match optional_str(call, index, name) {
        None => Ok(None),
        Some(raw) => raw.parse::<usize>().map(Some).map_err(|_| ToolError::BadArgs {
            message: format!("{}: argument '{name}' must be an integer, got '{raw}'", call.name),
        }),
    }
}

/// Register every built-in tool.
pub fn register_builtins(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    registry.register(Box::new(file::FileReadTool))?;
    registry.register(Box::new(file::FileWriteTool))?;
    registry.register(Box::new(file::FileEditTool))?;
    registry.register(Box::new(search::GlobSearchTool))?;
    registry.register(Box::new(search::GrepSearchTool))?;
    registry.register(Box::new(shell::BashExecTool))?;
    git::register_git_tools(registry)?;
    Ok(())
}
