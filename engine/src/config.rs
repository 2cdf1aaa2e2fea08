//! Runtime configuration, immutable after boot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::arbiter::PermissionMode;

/// Configuration failures are boot-fatal (exit code 3).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SandboxSection {
    /// Sandbox roots; the first entry is the subprocess working directory.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    /// Commands added to the default allowlist.
    #[serde(default)]
    pub extra_allowlist: Vec<String>,
    /// Commands added to the default blocklist.
    #[serde(default)]
    pub extra_blocklist: Vec<String>,
    /// Additional write-denied paths beyond the trust roots.
    #[serde(default)]
    pub protected_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    #[serde(default = "default_shell_timeout_ms")]
    pub shell_timeout_ms: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default = "default_max_read_lines")]
    pub max_read_lines: usize,
}

fn default_shell_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    200_000
}

fn default_max_read_lines() -> usize {
    500
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            shell_timeout_ms: default_shell_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            max_read_lines: default_max_read_lines(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BackendSection {
    /// Name of the environment variable carrying the model-backend endpoint;
    /// the only non-default variable allowed through to children.
    pub endpoint_env: Option<String>,
    /// Expected model identity, compared against the backend at boot.
    pub expected_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AuditSection {
    pub path: Option<PathBuf>,
}

/// Top-level `warden.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub limits: LimitsSection,
    /// Per-tool permission overrides: `file_write = "allow"`.
    #[serde(default)]
    pub permissions: HashMap<String, PermissionMode>,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub audit: AuditSection,
    /// Manifest location; defaults to `<first root>/warden.manifest.json`.
    pub manifest_path: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path` when present, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
