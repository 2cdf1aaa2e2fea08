//! Git tools, split by capability.
//!
//! The read subset (`status`, `diff`, `log`) is anchored like any other
//! untrusted source: commit messages and diff hunks can inject. The write
//! subset (`add`, `commit`) is action-class and provenance-gated.

use serde_json::json;
use warden_sandbox::PathMode;
use warden_types::{Capability, ToolCall};

use super::{ToolCtx, ToolOutput, optional_str, required_str};
use crate::anchor::scrub;
use crate::exec::spawn_argv;
use crate::registry::{ToolDescriptor, ToolFut, ToolHandler, ToolRegistry};
use crate::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GitToolKind {
    Status,
    Diff,
    Log,
    Add,
    Commit,
}

impl GitToolKind {
    fn name(self) -> &'static str {
        match self {
            GitToolKind::Status => "git_status",
            GitToolKind::Diff => "git_diff",
            GitToolKind::Log => "git_log",
            GitToolKind::Add => "git_add",
            GitToolKind::Commit => "git_commit",
        }
    }

    fn description(self) -> &'static str {
        match self {
            GitToolKind::Status => "Show working tree status",
            GitToolKind::Diff => "Show uncommitted changes, optionally for one path",
            GitToolKind::Log => "Show recent commit history",
            GitToolKind::Add => "Stage files for commit",
            GitToolKind::Commit => "Create a commit with the given message",
        }
    }

    fn capability(self) -> Capability {
        match self {
            GitToolKind::Status | GitToolKind::Diff | GitToolKind::Log => Capability::Read,
            GitToolKind::Add | GitToolKind::Commit => Capability::Action,
        }
    }
}

#[derive(Debug)]
struct GitTool {
    kind: GitToolKind,
}

impl GitTool {
    fn build_argv(&self, call: &ToolCall, ctx: &ToolCtx) -> Result<Vec<String>, ToolError> {
        let argv: Vec<String> = match self.kind {
            GitToolKind::Status => {
                vec!["status".into(), "--porcelain=v1".into(), "-b".into()]
            }
            GitToolKind::Diff => {
                let mut argv = vec!["diff".into()];
                if let Some(raw) = optional_str(call, 0, "path") {
                    let canonical = ctx.paths.validate(&raw, PathMode::Read)?;
                    argv.push("--".into());
                    argv.push(canonical.to_string_lossy().into_owned());
                }
                argv
            }
            GitToolKind::Log => {
                let limit = super::optional_usize(call, 0, "limit")?.unwrap_or(20).clamp(1, 200);
                vec!["log".into(), "--oneline".into(), format!("-n{limit}")]
            }
            GitToolKind::Add => {
                let raw = required_str(call, 0, "paths")?;
                let mut argv = vec!["add".into(), "--".into()];
                for piece in raw.split_whitespace() {
                    let canonical = ctx.paths.validate(piece, PathMode::Read)?;
                    argv.push(canonical.to_string_lossy().into_owned());
                }
                argv
            }
            GitToolKind::Commit => {
                let message = required_str(call, 0, "message")?;
                if message.trim().is_empty() {
                    return Err(ToolError::BadArgs {
                        message: "git_commit: message must not be empty".to_string(),
                    });
                }
                // One argv element: the message is data, never shell text.
                vec!["commit".into(), "-m".into(), message]
            }
        };
        Ok(argv)
    }
}

impl ToolHandler for GitTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.kind.name(),
            capability: self.kind.capability(),
            description: self.kind.description(),
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let argv = self.build_argv(call, ctx)?;
            let program = ctx.binaries.program("git");
            let env = ctx.child_env();

            let outcome =
                spawn_argv(&program, &argv, &ctx.working_dir, &env, ctx.limits).await?;
            if outcome.timed_out {
                return Err(ToolError::Timeout {
                    tool: self.kind.name().to_string(),
                    elapsed: ctx.limits.wall_clock,
                });
            }

            let stdout = scrub(&outcome.stdout);
            let stderr = scrub(&outcome.stderr);
            if outcome.exit_code != Some(0) {
                return Err(ToolError::ExecutionFailed {
                    tool: self.kind.name().to_string(),
                    message: format!(
                        "git exited with {:?}: {}",
                        outcome.exit_code,
                        stderr.trim()
                    ),
                });
            }

            match self.kind.capability() {
                // All git output is untrusted; history is writable by anyone
                // who ever committed to the repository.
                Capability::Read => Ok(ToolOutput::read(stdout, "git", true)
                    .with_truncated(outcome.truncated)
                    .with_bytes_read(outcome.stdout.len() as u64)),
                _ => Ok(ToolOutput::data(json!({
                    "output": stdout,
                }))
                .with_truncated(outcome.truncated)),
            }
        })
    }
}

/// Register the git tool family.
pub fn register_git_tools(registry: &mut ToolRegistry) -> Result<(), ToolError> {
    for kind in [
        GitToolKind::Status,
        GitToolKind::Diff,
        GitToolKind::Log,
        GitToolKind::Add,
        GitToolKind::Commit,
    ] {
        registry.register(Box::new(GitTool { kind }))?;
    }
    Ok(())
}
