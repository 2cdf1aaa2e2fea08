//! Sandbox-rooted glob and grep tools.

use std::io::Read as _;
use std::path::Path;

use ignore::WalkBuilder;
use serde_json::json;
use warden_sandbox::PathMode;
use warden_types::{Capability, ToolCall};

use super::{ToolCtx, ToolOutput, optional_str, required_str};
use crate::registry::{ToolDescriptor, ToolFut, ToolHandler};
use crate::ToolError;

const MAX_GLOB_RESULTS: usize = 1_000;
const MAX_GREP_MATCHES: usize = 200;

#[derive(Debug, Default)]
pub struct GlobSearchTool;

impl ToolHandler for GlobSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "glob_search",
            capability: Capability::Read,
            description: "Find files matching a glob pattern within the sandbox",
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let pattern = required_str(call, 0, "pattern")?;
            let glob = globset::GlobBuilder::new(&pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| ToolError::BadArgs {
                    message: format!("glob_search: invalid pattern '{pattern}': {e}"),
                })?
                .compile_matcher();

            let mut matches: Vec<String> = Vec::new();
            let mut truncated = false;
            'roots: for root in &ctx.paths.policy().allowed_dirs {
                for entry in WalkBuilder::new(root).build().flatten() {
                    if !entry.file_type().is_some_and(|t| t.is_file()) {
                        continue;
                    }
                    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
                    if glob.is_match(rel) {
                        if matches.len() >= MAX_GLOB_RESULTS {
                            truncated = true;
                            break 'roots;
                        }
                        matches.push(rel.to_string_lossy().into_owned());
                    }
                }
            }
            matches.sort();

            // Names only, never content: glob results do not taint the turn.
            Ok(ToolOutput::data(json!(matches)).with_truncated(truncated))
        })
    }
}

#[derive(Debug, Default)]
pub struct GrepSearchTool;

impl ToolHandler for GrepSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "grep_search",
            capability: Capability::Read,
            description: "Search file contents under the sandbox with a regex",
        }
    }

    fn invoke<'a>(&'a self, call: &'a ToolCall, ctx: &'a mut ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let pattern = required_str(call, 0, "pattern")?;
            let scope = optional_str(call, 1, "path");
            let regex = regex::RegexBuilder::new(&pattern)
                .size_limit(1 << 20)
                .build()
                .map_err(|e| ToolError::BadArgs {
                    message: format!("grep_search: invalid pattern: {e}"),
                })?;

            let mut roots: Vec<std::path::PathBuf> = Vec::new();
            match scope {
                Some(raw) => roots.push(ctx.paths.validate(&raw, PathMode::Read)?),
                None => roots.extend(ctx.paths.policy().allowed_dirs.iter().cloned()),
            }

            let mut lines: Vec<String> = Vec::new();
            let mut scanned: u64 = 0;
            let mut truncated = false;
            'roots: for root in &roots {
                let display_root = if root.is_file() {
                    root.parent().unwrap_or(root).to_path_buf()
                } else {
                    root.clone()
                };
                for entry in WalkBuilder::new(root).build().flatten() {
                    if !entry.file_type().is_some_and(|t| t.is_file()) && !root.is_file() {
                        continue;
                    }
                    let path = entry.path();
                    if looks_binary(path) {
                        continue;
                    }
                    let Ok(bytes) = std::fs::read(path) else {
                        continue;
                    };
                    scanned += bytes.len() as u64;
                    let text = String::from_utf8_lossy(&bytes);
                    let rel = path.strip_prefix(&display_root).unwrap_or(path);
                    for (number, line) in text.lines().enumerate() {
                        if regex.is_match(line) {
                            if lines.len() >= MAX_GREP_MATCHES {
                                truncated = true;
                                break 'roots;
                            }
                            lines.push(format!("{}:{}: {line}", rel.display(), number + 1));
                        }
                    }
                }
            }

            // Matched lines are file content; grep always taints, even when
            // every hit is inside a trusted file.
            Ok(ToolOutput::read(lines.join("\n"), "grep", true)
                .with_truncated(truncated)
                .with_bytes_read(scanned))
        })
    }
}

/// NUL in the first 8 KiB marks a file as binary; non-UTF-8 text is decoded
/// lossily instead.
fn looks_binary(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return true;
    };
    let mut buf = [0u8; 8192];
    match file.read(&mut buf) {
        Ok(n) => buf[..n].contains(&0),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_marks_binary() {
        let temp = tempfile::tempdir().unwrap();
        let bin = temp.path().join("blob");
        std::fs::write(&bin, b"ab\x00cd").unwrap();
        let text = temp.path().join("plain.txt");
        std::fs::write(&text, "hello").unwrap();
        assert!(looks_binary(&bin));
        assert!(!looks_binary(&text));
    }

    #[test]
    fn missing_file_treated_as_binary() {
        assert!(looks_binary(Path::new("/nonexistent/ghost")));
    }
}
