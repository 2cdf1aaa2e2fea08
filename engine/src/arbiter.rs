//! Per-tool allow/ask/deny arbitration.

use std::collections::HashMap;
use std::sync::Arc;

use warden_types::Capability;

/// Disposition for one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    Allow,
    Ask,
    Deny,
}

/// Confirmation request surfaced to the operator for `ask` tools.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub tool: String,
    pub summary: String,
}

/// UI collaborator that answers `ask` prompts.
///
/// The dispatcher suspends on this call; a `false` answer becomes
/// `permission_denied` without executing the tool.
pub trait ApprovalPrompt: Send + Sync {
    fn approve(&self, request: &ApprovalRequest) -> bool;
}

/// Prompt that refuses everything; the safe default when no UI is attached.
pub struct DenyAllPrompt;

impl ApprovalPrompt for DenyAllPrompt {
    fn approve(&self, _request: &ApprovalRequest) -> bool {
        false
    }
}

/// Outcome of arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
}

/// Static classification plus session overrides.
///
/// `--dangerously-skip-permissions` promotes `ask` to `allow` but never
/// touches `deny`.
pub struct PermissionArbiter {
    modes: HashMap<String, PermissionMode>,
    skip_prompts: bool,
    prompt: Arc<dyn ApprovalPrompt>,
}

impl PermissionArbiter {
    #[must_use]
    pub fn new(prompt: Arc<dyn ApprovalPrompt>) -> Self {
        Self {
            modes: HashMap::new(),
            skip_prompts: false,
            prompt,
        }
    }

    /// Default mode for a capability class: reads run freely, anything that
    /// mutates or spawns asks first.
    #[must_use]
    pub fn default_mode(capability: Capability) -> PermissionMode {
        match capability {
            Capability::Read | Capability::Meta => PermissionMode::Allow,
            Capability::Write | Capability::Action => PermissionMode::Ask,
        }
    }

    /// Override the mode for one tool (config or session command).
    pub fn set_mode(&mut self, tool: impl Into<String>, mode: PermissionMode) {
        self.modes.insert(tool.into(), mode);
    }

    pub fn set_skip_prompts(&mut self, skip: bool) {
        self.skip_prompts = skip;
    }

    #[must_use]
    pub fn mode_for(&self, tool: &str, capability: Capability) -> PermissionMode {
        self.modes
            .get(tool)
            .copied()
            .unwrap_or_else(|| Self::default_mode(capability))
    }

    /// Arbitrate one call. `ask` suspends on the prompt collaborator.
    #[must_use]
    pub fn arbitrate(&self, tool: &str, capability: Capability, summary: &str) -> Verdict {
        match self.mode_for(tool, capability) {
            PermissionMode::Allow => Verdict::Allowed,
            PermissionMode::Deny => Verdict::Denied,
            PermissionMode::Ask => {
                if self.skip_prompts {
                    return Verdict::Allowed;
                }
                let request = ApprovalRequest {
                    tool: tool.to_string(),
                    summary: summary.to_string(),
                };
                if self.prompt.approve(&request) {
                    Verdict::Allowed
                } else {
                    Verdict::Denied
                }
            }
        }
    }
}
