//! Boot-time absolute path capture for spawned binaries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::IntegrityError;

/// Binaries the runtime may spawn.
pub const DEFAULT_BINARIES: &[&str] = &["git", "python", "python3", "node"];

/// Absolute program paths resolved once at boot.
///
/// Spawns use these instead of a runtime `PATH` lookup, so a directory
/// prepended to `PATH` after boot cannot substitute a binary.
#[derive(Debug, Clone, Default)]
pub struct BinaryPaths {
    resolved: HashMap<String, PathBuf>,
}

impl BinaryPaths {
    /// Resolve each name; names absent from `PATH` are skipped rather than
    /// fatal, since the allowlist may include tools this host lacks.
    #[must_use]
    pub fn capture(names: &[&str]) -> Self {
        let mut resolved = HashMap::new();
        for name in names {
            match which::which(name) {
                Ok(path) => {
                    tracing::debug!(binary = name, path = %path.display(), "resolved at boot");
                    resolved.insert((*name).to_string(), path);
                }
                Err(_) => {
                    tracing::debug!(binary = name, "not present on PATH at boot");
                }
            }
        }
        Self { resolved }
    }

    /// Resolve a single required binary.
    pub fn require(&self, name: &str) -> Result<&Path, IntegrityError> {
        self.resolved
            .get(name)
            .map(PathBuf::as_path)
            .ok_or_else(|| IntegrityError::BinaryNotFound {
                name: name.to_string(),
            })
    }

    /// The absolute path for `name`, falling back to the bare name when the
    /// binary was not present at boot (spawn will then fail loudly).
    #[must_use]
    pub fn program(&self, name: &str) -> PathBuf {
        self.resolved
            .get(name)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// A `PATH` value covering only the parent directories of resolved
    /// binaries, suitable for pinning into sanitized child environments.
    #[must_use]
    pub fn pinned_path(&self) -> String {
        let mut dirs: Vec<String> = self
            .resolved
            .values()
            .filter_map(|p| p.parent())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs.join(":")
    }
}
