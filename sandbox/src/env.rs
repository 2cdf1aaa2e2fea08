//! Environment allowlist applied before every spawn.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::SandboxError;

/// Variables every child process may inherit.
const DEFAULT_ALLOWLIST: &[&str] = &["HOME", "LANG", "LC_*", "TERM", "TZ"];

/// Strips the environment down to an explicit allowlist.
///
/// The inverse of a denylist: anything not named here is gone, so a secret
/// with an unanticipated name cannot leak into a child process. `PATH` is
/// never inherited; the boot-resolved value is pinned instead.
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    allowlist: GlobSet,
    pinned_path: Option<String>,
}

impl EnvPolicy {
    /// Build from the default allowlist plus any extra names (e.g. the
    /// configured backend endpoint variable).
    pub fn new(extra: &[String]) -> Result<Self, SandboxError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in DEFAULT_ALLOWLIST
            .iter()
            .map(|s| (*s).to_string())
            .chain(extra.iter().cloned())
        {
            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(false)
                .build()
                .map_err(|e| SandboxError::InvalidPolicy {
                    message: format!("invalid env allowlist pattern '{pattern}': {e}"),
                })?;
            builder.add(glob);
        }
        let allowlist = builder.build().map_err(|e| SandboxError::InvalidPolicy {
            message: format!("invalid env allowlist: {e}"),
        })?;
        Ok(Self {
            allowlist,
            pinned_path: None,
        })
    }

    /// Pin the `PATH` value captured at boot (absolute directories only).
    #[must_use]
    pub fn with_pinned_path(mut self, path: impl Into<String>) -> Self {
        self.pinned_path = Some(path.into());
        self
    }

    /// Filter a raw environment down to the allowlist.
    #[must_use]
    pub fn sanitize(&self, env: &[(String, String)]) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = env
            .iter()
            .filter(|(k, _)| k != "PATH" && self.allowlist.is_match(k))
            .cloned()
            .collect();
        if let Some(path) = &self.pinned_path {
            out.push(("PATH".to_string(), path.clone()));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn keeps_only_allowlisted_vars() {
        let policy = EnvPolicy::new(&[]).unwrap();
        let out = policy.sanitize(&env(&[
            ("HOME", "/home/u"),
            ("LANG", "en_US.UTF-8"),
            ("AWS_SECRET_ACCESS_KEY", "hunter2"),
            ("SSH_AUTH_SOCK", "/tmp/agent"),
        ]));
        let keys: Vec<&str> = out.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["HOME", "LANG"]);
    }

    #[test]
    fn lc_wildcard_matches() {
        let policy = EnvPolicy::new(&[]).unwrap();
        let out = policy.sanitize(&env(&[("LC_ALL", "C"), ("LC_TIME", "C")]));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn inherited_path_is_dropped_and_pinned_path_wins() {
        let policy = EnvPolicy::new(&[])
            .unwrap()
            .with_pinned_path("/usr/bin:/bin");
        let out = policy.sanitize(&env(&[("PATH", "/tmp/evil:/usr/bin")]));
        assert_eq!(out, env(&[("PATH", "/usr/bin:/bin")]));
    }

    #[test]
    fn extra_names_extend_the_allowlist() {
        let policy = EnvPolicy::new(&["WARDEN_BACKEND_URL".to_string()]).unwrap();
        let out = policy.sanitize(&env(&[("WARDEN_BACKEND_URL", "http://127.0.0.1:8080")]));
        assert_eq!(out.len(), 1);
    }
}
