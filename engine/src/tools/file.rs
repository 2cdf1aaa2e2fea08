//! File tools: read, write, edit.

use std::io::Write as _;
use std::path::Path;

use serde_json::json;
use warden_sandbox::PathMode;
use warden_types::{Capability, ToolCall};

use super::{ToolCtx, ToolOutput, optional_usize, required_str};
use crate::registry::{ToolDescriptor, ToolFut, ToolHandler};
use crate::ToolError;

/// Atomic write: temp file in the destination directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ToolError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_failed(path, &e))?;
    tmp.write_all(bytes).map_err(|e| io_failed(path, &e))?;
    tmp.as_file().sync_all().map_err(|e| io_failed(path, &e))?;
    tmp.persist(path).map_err(|e| io_failed(path, &e.error))?;
    Ok(())
}

fn io_failed(path: &Path, e: &dyn std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool: "file".to_string(),
        message: format!("{}: {e}", path.display()),
    }
}

/// Right-aligned line numbers: `  12| content`.
fn number_lines(lines: &[&str], start: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let width = (start + lines.len() - 1).to_string().len();
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let n = start + i;
        out.push_str(&format!("{n:>width$}| {line}\n"));
    }
    out.pop();
    out
}

#[derive(Debug, Default)]
pub struct FileReadTool;

impl ToolHandler for FileReadTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "file_read",
            capability: Capability::Read,
            description: "Read a file with line numbers, bounded by the read-line limit",
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let raw_path = required_str(call, 0, "path")?;
            let offset = optional_usize(call, 1, "offset")?.unwrap_or(1).max(1);
            let limit = optional_usize(call, 2, "limit")?
                .unwrap_or(ctx.max_read_lines)
                .min(ctx.max_read_lines);

            let canonical = ctx.paths.validate(&raw_path, PathMode::Read)?;
            let bytes = std::fs::read(&canonical).map_err(|e| io_failed(&canonical, &e))?;
            let text = String::from_utf8_lossy(&bytes);

            let all: Vec<&str> = text.lines().collect();
            let start = offset.min(all.len().saturating_add(1));
            let selected: Vec<&str> = all.iter().skip(start - 1).take(limit).copied().collect();
            let truncated = start - 1 + selected.len() < all.len();
            let bytes_read: u64 = selected.iter().map(|l| l.len() as u64 + 1).sum();

            let content = number_lines(&selected, start);
            let untrusted = !ctx.trust.is_trusted(&canonical);
            Ok(ToolOutput::read(content, ctx.display_path(&canonical), untrusted)
                .with_truncated(truncated)
                .with_bytes_read(bytes_read))
        })
    }
}

#[derive(Debug, Default)]
pub struct FileWriteTool;

impl ToolHandler for FileWriteTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "file_write",
            capability: Capability::Action,
            description: "Write a file atomically, recording a reversible backup",
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let raw_path = required_str(call, 0, "path")?;
            let content = required_str(call, 1, "content")?;

            let canonical = ctx.paths.validate(&raw_path, PathMode::Write)?;
            if let Some(parent) = canonical.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_failed(&canonical, &e))?;
            }
            {
                let mut backups = ctx.backups.lock().unwrap_or_else(|p| p.into_inner());
                backups.record(&canonical)?;
            }
            write_atomic(&canonical, content.as_bytes())?;

            Ok(ToolOutput::data(json!({
                "path": ctx.display_path(&canonical),
                "bytes_written": content.len(),
            })))
        })
    }
}

#[derive(Debug, Default)]
pub struct FileEditTool;

impl ToolHandler for FileEditTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "file_edit",
            capability: Capability::Action,
            description: "Replace a uniquely matching string, or a given occurrence of it",
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let raw_path = required_str(call, 0, "path")?;
            let find = required_str(call, 1, "find")?;
            let replace = required_str(call, 2, "replace")?;
            let occurrence = optional_usize(call, 3, "occurrence")?;
            if find.is_empty() {
                return Err(ToolError::BadArgs {
                    message: "file_edit: 'find' must not be empty".to_string(),
                });
            }

            let canonical = ctx.paths.validate(&raw_path, PathMode::Edit)?;
            if !canonical.exists() {
                return Err(ToolError::NotFound {
                    what: canonical.display().to_string(),
                });
            }
            let bytes = std::fs::read(&canonical).map_err(|e| io_failed(&canonical, &e))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();

            let positions: Vec<usize> = text.match_indices(&find).map(|(i, _)| i).collect();
            let chosen = match (positions.len(), occurrence) {
                (0, _) => {
                    return Err(ToolError::NotFound {
                        what: format!("pattern '{find}' in {}", ctx.display_path(&canonical)),
                    });
                }
                (1, None) => positions[0],
                (count, None) => {
                    return Err(ToolError::AmbiguousMatch {
                        needle: find.clone(),
                        count,
                    });
                }
                (count, Some(ordinal)) => {
                    if ordinal == 0 || ordinal > count {
                        return Err(ToolError::NotFound {
                            what: format!("occurrence {ordinal} of '{find}' ({count} matches)"),
                        });
                    }
                    positions[ordinal - 1]
                }
            };

            let mut edited = String::with_capacity(text.len());
            edited.push_str(&text[..chosen]);
            edited.push_str(&replace);
            edited.push_str(&text[chosen + find.len()..]);

            {
                let mut backups = ctx.backups.lock().unwrap_or_else(|p| p.into_inner());
                backups.record(&canonical)?;
            }
            write_atomic(&canonical, edited.as_bytes())?;

            Ok(ToolOutput::data(json!({
                "path": ctx.display_path(&canonical),
                "matches": positions.len(),
                "replaced_at": chosen,
            })))
        })
    }
}
