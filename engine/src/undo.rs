//! Reversible backups for write and edit tools.

use std::path::{Path, PathBuf};

use crate::ToolError;

/// Prior state of one mutated file.
#[derive(Debug, Clone)]
struct Backup {
    path: PathBuf,
    /// `None` when the file did not exist before the mutation.
    prior: Option<Vec<u8>>,
}

/// Session-scoped stack of reversible file mutations.
///
/// Every `file_write`/`file_edit` pushes the destination's prior content
/// before touching it; the operator's `/undo` pops and restores.
#[derive(Debug, Default)]
pub struct BackupStore {
    stack: Vec<Backup>,
}

impl BackupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state of `path` ahead of a mutation.
    pub fn record(&mut self, path: &Path) -> Result<(), ToolError> {
        let prior = if path.exists() {
            Some(std::fs::read(path).map_err(|e| ToolError::ExecutionFailed {
                tool: "backup".to_string(),
                message: format!("{}: {e}", path.display()),
            })?)
        } else {
            None
        };
        self.stack.push(Backup {
            path: path.to_path_buf(),
            prior,
        });
        Ok(())
    }

    /// Restore the most recent mutation. Returns the restored path.
    pub fn undo(&mut self) -> Result<PathBuf, ToolError> {
        let backup = self.stack.pop().ok_or_else(|| ToolError::NotFound {
            what: "nothing to undo".to_string(),
        })?;
        match &backup.prior {
            Some(bytes) => {
                std::fs::write(&backup.path, bytes).map_err(|e| ToolError::ExecutionFailed {
                    tool: "undo".to_string(),
                    message: format!("{}: {e}", backup.path.display()),
                })?;
            }
            None => {
                if backup.path.exists() {
                    std::fs::remove_file(&backup.path).map_err(|e| {
                        ToolError::ExecutionFailed {
                            tool: "undo".to_string(),
                            message: format!("{}: {e}", backup.path.display()),
                        }
                    })?;
                }
            }
        }
        Ok(backup.path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
