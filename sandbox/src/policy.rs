//! Immutable sandbox configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::SandboxError;

/// Default first-token allowlist.
pub const DEFAULT_COMMAND_ALLOWLIST: &[&str] = &[
    "ls", "cat", "type", "find", "grep", "cp", "mv", "head", "tail", "wc", "sort", "uniq", "diff",
    "git", "python", "python3", "pip", "node", "echo",
];

/// Commands that shadow the allowlist unconditionally.
pub const DEFAULT_COMMAND_BLOCKLIST: &[&str] = &[
    "env", "set", "printenv", "export", "mklink", "npx", "curl", "wget",
];

/// Suffixes denied as write/edit destinations.
pub const DEFAULT_BLOCKED_WRITE_EXTENSIONS: &[&str] = &[
    ".sh", ".bash", ".bat", ".cmd", ".ps1", ".psm1", ".exe", ".com", ".scr", ".msi", ".vbs",
    ".lnk",
];

/// Shell-meta tokens forbidden anywhere in a validated command.
pub const DEFAULT_BLOCKED_METACHARACTERS: &[&str] = &[
    "&&", "||", ";", "|", "$(", "`", "${", ">>", ">", "<", "2>",
];

/// Commands whose non-option arguments are confined as paths.
pub const DEFAULT_PATH_ARG_COMMANDS: &[&str] = &[
    "ls", "cat", "type", "find", "grep", "cp", "mv", "head", "tail", "wc", "sort", "uniq", "diff",
];

/// Immutable sandbox configuration, frozen at boot.
///
/// `allowed_dirs` entries are canonicalized at construction so descendant
/// checks compare resolved paths against resolved roots.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub allowed_dirs: Vec<PathBuf>,
    pub command_allowlist: HashSet<String>,
    pub command_blocklist: HashSet<String>,
    pub blocked_write_extensions: HashSet<String>,
    pub blocked_metacharacters: Vec<String>,
    pub path_arg_commands: HashSet<String>,
    pub protected_paths: Vec<PathBuf>,
}

impl SandboxPolicy {
    /// Build a policy over the given sandbox roots with default lists.
    ///
    /// Fails if any root does not exist or cannot be canonicalized; a
    /// sandbox anchored to a phantom directory confines nothing.
    pub fn new(allowed_dirs: Vec<PathBuf>) -> Result<Self, SandboxError> {
        if allowed_dirs.is_empty() {
            return Err(SandboxError::InvalidPolicy {
                message: "at least one sandbox root is required".to_string(),
            });
        }
        let mut roots = Vec::with_capacity(allowed_dirs.len());
        for root in allowed_dirs {
            let canonical =
                std::fs::canonicalize(&root).map_err(|e| SandboxError::InvalidPolicy {
                    message: format!("cannot canonicalize sandbox root {}: {e}", root.display()),
                })?;
            roots.push(canonical);
        }

        Ok(Self {
            allowed_dirs: roots,
            command_allowlist: to_set(DEFAULT_COMMAND_ALLOWLIST),
            command_blocklist: to_set(DEFAULT_COMMAND_BLOCKLIST),
            blocked_write_extensions: to_set(DEFAULT_BLOCKED_WRITE_EXTENSIONS),
            blocked_metacharacters: DEFAULT_BLOCKED_METACHARACTERS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            path_arg_commands: to_set(DEFAULT_PATH_ARG_COMMANDS),
            protected_paths: Vec::new(),
        })
    }

    /// The working directory pinned onto every spawned subprocess.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.allowed_dirs[0]
    }

    /// Register a write-denied path (trust roots, memory files, manifest).
    ///
    /// Canonicalized when the file exists so the check matches the resolved
    /// form the path validator produces.
    pub fn protect(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let canonical = std::fs::canonicalize(&path).unwrap_or(path);
        if !self.protected_paths.contains(&canonical) {
            self.protected_paths.push(canonical);
        }
    }

    #[must_use]
    pub fn is_protected(&self, canonical: &Path) -> bool {
        self.protected_paths.iter().any(|p| p == canonical)
    }

    #[must_use]
    pub fn is_within_allowed_dirs(&self, canonical: &Path) -> bool {
        self.allowed_dirs.iter().any(|root| canonical.starts_with(root))
    }

    /// Case-insensitive suffix check against `blocked_write_extensions`.
    #[must_use]
    pub fn has_blocked_extension(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        self.blocked_write_extensions
            .iter()
            .find(|ext| name.ends_with(ext.as_str()))
            .cloned()
    }
}

fn to_set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_canonicalizes_roots() {
        let temp = tempdir().unwrap();
        let policy = SandboxPolicy::new(vec![temp.path().to_path_buf()]).unwrap();
        assert_eq!(
            policy.allowed_dirs[0],
            std::fs::canonicalize(temp.path()).unwrap()
        );
    }

    #[test]
    fn new_rejects_missing_root() {
        let result = SandboxPolicy::new(vec![PathBuf::from("/nonexistent/warden/root")]);
        assert!(result.is_err());
    }

    #[test]
    fn new_rejects_empty_roots() {
        assert!(SandboxPolicy::new(vec![]).is_err());
    }

    #[test]
    fn blocklist_contains_spec_entries() {
        let temp = tempdir().unwrap();
        let policy = SandboxPolicy::new(vec![temp.path().to_path_buf()]).unwrap();
        for cmd in ["env", "printenv", "npx", "curl", "wget"] {
            assert!(policy.command_blocklist.contains(cmd), "missing {cmd}");
        }
    }

    #[test]
    fn blocked_extension_is_case_insensitive() {
        let temp = tempdir().unwrap();
        let policy = SandboxPolicy::new(vec![temp.path().to_path_buf()]).unwrap();
        assert!(policy.has_blocked_extension(Path::new("run.SH")).is_some());
        assert!(policy.has_blocked_extension(Path::new("setup.Ps1")).is_some());
        assert!(policy.has_blocked_extension(Path::new("notes.txt")).is_none());
    }

    #[test]
    fn protect_deduplicates() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("manifest.json");
        std::fs::write(&file, "{}").unwrap();
        let mut policy = SandboxPolicy::new(vec![temp.path().to_path_buf()]).unwrap();
        policy.protect(&file);
        policy.protect(&file);
        assert_eq!(policy.protected_paths.len(), 1);
        assert!(policy.is_protected(&std::fs::canonicalize(&file).unwrap()));
    }
}
