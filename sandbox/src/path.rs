//! Path confinement with symlink resolution.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::{SandboxError, SandboxPolicy};

/// Operation the caller intends to perform on the validated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMode {
    Read,
    Write,
    Edit,
}

impl PathMode {
    fn is_mutation(self) -> bool {
        matches!(self, PathMode::Write | PathMode::Edit)
    }
}

/// Validates candidate paths against the sandbox policy.
///
/// Validation operates on the resolved path, never the supplied literal:
/// a symlink inside the sandbox pointing outside is rejected, which closes
/// the TOCTOU-via-later-resolution class.
#[derive(Debug, Clone)]
pub struct PathValidator {
    policy: Arc<SandboxPolicy>,
}

impl PathValidator {
    #[must_use]
    pub fn new(policy: Arc<SandboxPolicy>) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    /// Validate `raw` for `mode`, resolving relative paths against the first
    /// sandbox root. Returns the canonical absolute path.
    pub fn validate(&self, raw: &str, mode: PathMode) -> Result<PathBuf, SandboxError> {
        self.validate_in(raw, self.policy.working_dir(), mode)
    }

    /// Validate `raw` against an explicit base directory.
    pub fn validate_in(
        &self,
        raw: &str,
        base: &Path,
        mode: PathMode,
    ) -> Result<PathBuf, SandboxError> {
        let input = PathBuf::from(raw);
        if raw.chars().any(is_unsafe_path_char)
            || input.components().any(|c| matches!(c, Component::ParentDir))
        {
            return Err(SandboxError::OutsideSandbox {
                attempted: input.clone(),
                resolved: input,
            });
        }

        let resolved = if input.is_absolute() {
            input
        } else {
            base.join(input)
        };

        let canonical = self.canonicalize(&resolved, mode)?;

        if !self.policy.is_within_allowed_dirs(&canonical) {
            return Err(SandboxError::OutsideSandbox {
                attempted: resolved,
                resolved: canonical,
            });
        }

        if mode.is_mutation() {
            if let Some(extension) = self.policy.has_blocked_extension(&canonical) {
                return Err(SandboxError::BlockedExtension {
                    path: canonical,
                    extension,
                });
            }
            if self.policy.is_protected(&canonical) {
                return Err(SandboxError::Protected { path: canonical });
            }
        }

        Ok(canonical)
    }

    /// Canonicalize, following symlinks. A write target need not exist yet;
    /// its parent must.
    fn canonicalize(&self, resolved: &Path, mode: PathMode) -> Result<PathBuf, SandboxError> {
        if resolved.exists() {
            return std::fs::canonicalize(resolved).map_err(|_| SandboxError::OutsideSandbox {
                attempted: resolved.to_path_buf(),
                resolved: resolved.to_path_buf(),
            });
        }
        if !mode.is_mutation() {
            return Err(SandboxError::NotFound {
                path: resolved.to_path_buf(),
            });
        }
        let parent = resolved.parent().ok_or_else(|| SandboxError::OutsideSandbox {
            attempted: resolved.to_path_buf(),
            resolved: resolved.to_path_buf(),
        })?;
        let parent_canon = self.canonicalize_nearest(parent)?;
        let mut rebuilt = parent_canon;
        rebuilt.push(resolved.file_name().unwrap_or_default());
        Ok(rebuilt)
    }

    /// Walk up until an existing ancestor canonicalizes, then reattach the
    /// missing tail. Lets `file_write` create nested directories while the
    /// descent check still runs on resolved ancestors.
    fn canonicalize_nearest(&self, path: &Path) -> Result<PathBuf, SandboxError> {
        let mut missing: Vec<std::ffi::OsString> = Vec::new();
        let mut cursor = path.to_path_buf();
        loop {
            if cursor.exists() {
                let mut canonical =
                    std::fs::canonicalize(&cursor).map_err(|_| SandboxError::OutsideSandbox {
                        attempted: path.to_path_buf(),
                        resolved: cursor.clone(),
                    })?;
                for segment in missing.iter().rev() {
                    canonical.push(segment);
                }
                return Ok(canonical);
            }
            match (cursor.file_name(), cursor.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    cursor = parent.to_path_buf();
                }
                _ => {
                    return Err(SandboxError::OutsideSandbox {
                        attempted: path.to_path_buf(),
                        resolved: cursor,
                    });
                }
            }
        }
    }
}

/// Control and bidirectional-override characters never valid in a path.
fn is_unsafe_path_char(c: char) -> bool {
    matches!(
        c,
        '\u{0000}'..='\u{001f}'
            | '\u{007f}'
            | '\u{0080}'..='\u{009f}'
            | '\u{061c}'
            | '\u{200e}'
            | '\u{200f}'
            | '\u{202a}'..='\u{202e}'
            | '\u{2066}'..='\u{2069}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn validator(root: &Path) -> PathValidator {
        let policy = SandboxPolicy::new(vec![root.to_path_buf()]).unwrap();
        PathValidator::new(Arc::new(policy))
    }

    #[test]
    fn relative_read_inside_sandbox() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("notes.txt"), "hi").unwrap();
        let v = validator(temp.path());
        let resolved = v.validate("notes.txt", PathMode::Read).unwrap();
        assert!(resolved.ends_with("notes.txt"));
    }

    #[test]
    fn read_of_missing_file_is_not_found() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let err = v.validate("ghost.txt", PathMode::Read).unwrap_err();
        assert!(matches!(err, SandboxError::NotFound { .. }));
    }

    #[test]
    fn absolute_path_outside_sandbox_rejected() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let err = v.validate("/etc", PathMode::Read).unwrap_err();
        assert_eq!(err.kind(), warden_types::ErrorKind::OutsideSandbox);
    }

    #[test]
    fn parent_dir_components_rejected() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let err = v.validate("../escape.txt", PathMode::Read).unwrap_err();
        assert!(matches!(err, SandboxError::OutsideSandbox { .. }));
    }

    #[test]
    fn bidi_override_in_path_rejected() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let err = v.validate("evil\u{202e}txt.sh", PathMode::Read).unwrap_err();
        assert!(matches!(err, SandboxError::OutsideSandbox { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_sandbox_rejected() {
        let outside = tempdir().unwrap();
        let inside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret"),
            inside.path().join("innocent"),
        )
        .unwrap();
        let v = validator(inside.path());
        let err = v.validate("innocent", PathMode::Read).unwrap_err();
        assert!(matches!(err, SandboxError::OutsideSandbox { .. }));
    }

    #[test]
    fn write_to_new_file_allowed() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let resolved = v.validate("fresh.txt", PathMode::Write).unwrap();
        assert!(resolved.ends_with("fresh.txt"));
    }

    #[test]
    fn write_to_new_nested_path_allowed() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let resolved = v.validate("deep/nested/fresh.txt", PathMode::Write).unwrap();
        assert!(resolved.ends_with("deep/nested/fresh.txt"));
    }

    #[test]
    fn write_with_blocked_extension_rejected() {
        let temp = tempdir().unwrap();
        let v = validator(temp.path());
        let err = v.validate("helper.sh", PathMode::Write).unwrap_err();
        assert_eq!(err.kind(), warden_types::ErrorKind::BlockedExtension);
    }

    #[test]
    fn read_of_blocked_extension_is_fine() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("build.sh"), "echo").unwrap();
        let v = validator(temp.path());
        assert!(v.validate("build.sh", PathMode::Read).is_ok());
    }

    #[test]
    fn edit_of_protected_path_rejected() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("MEMORY.json");
        std::fs::write(&target, "{}").unwrap();
        let mut policy = SandboxPolicy::new(vec![temp.path().to_path_buf()]).unwrap();
        policy.protect(&target);
        let v = PathValidator::new(Arc::new(policy));
        let err = v.validate("MEMORY.json", PathMode::Edit).unwrap_err();
        assert_eq!(err.kind(), warden_types::ErrorKind::Protected);
    }
}
