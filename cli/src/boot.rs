//! Boot sequence: config, integrity verification, engine assembly.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use warden_engine::arbiter::{ApprovalPrompt, ApprovalRequest, PermissionArbiter};
use warden_engine::exec::ExecLimits;
use warden_engine::tools::{ToolCtx, register_builtins};
use warden_engine::undo::BackupStore;
use warden_engine::{AuditEvent, AuditLog, Dispatcher, RuntimeConfig, ToolRegistry, TrustRegistry};
use warden_integrity::{BinaryPaths, IntegrityError, Manifest};
use warden_sandbox::{CommandSandbox, EnvPolicy, PathValidator, SandboxPolicy};

use crate::Args;
use crate::session::Session;

const PASSPHRASE_ENV: &str = "WARDEN_PASSPHRASE";
const INTERPRETERS: &[&str] = &["python", "python3", "node"];

/// Boot failure classes, mapped to exit codes in `main`.
#[derive(Debug)]
pub enum BootFailure {
    Integrity(String),
    Config(String),
    PermissionRefused(String),
}

impl std::fmt::Display for BootFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootFailure::Integrity(m) => write!(f, "integrity failure: {m}"),
            BootFailure::Config(m) => write!(f, "configuration error: {m}"),
            BootFailure::PermissionRefused(m) => write!(f, "permission refused: {m}"),
        }
    }
}

fn config_err(message: impl std::fmt::Display) -> BootFailure {
    BootFailure::Config(message.to_string())
}

fn integrity_err(error: &IntegrityError) -> BootFailure {
    BootFailure::Integrity(error.to_string())
}

/// Interactive yes/no prompt on stderr/stdin.
struct TtyPrompt;

impl ApprovalPrompt for TtyPrompt {
    fn approve(&self, request: &ApprovalRequest) -> bool {
        eprintln!("approve {}? [y/N] {}", request.tool, request.summary);
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

pub fn run(args: Args) -> Result<(), BootFailure> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("warden.toml"));
    let config = RuntimeConfig::load_or_default(&config_path).map_err(config_err)?;

    let mut roots = if args.root.is_empty() {
        config.sandbox.roots.clone()
    } else {
        args.root.clone()
    };
    if roots.is_empty() {
        roots.push(std::env::current_dir().map_err(config_err)?);
    }

    let manifest_path = config
        .manifest_path
        .clone()
        .unwrap_or_else(|| roots[0].join("warden.manifest.json"));

    if let Some(plugins_dir) = &args.plugins_dir {
        if !plugins_dir.is_dir() {
            return Err(config_err(format!(
                "plugins dir is not a directory: {}",
                plugins_dir.display()
            )));
        }
        // Recorded only. Nothing is loaded implicitly; plugin registration
        // happens behind this explicit flag each boot.
        tracing::info!(dir = %plugins_dir.display(), "plugins directory noted");
    }

    if args.generate_manifest {
        let passphrase = read_passphrase()?;
        let trust_roots = default_trust_roots(&config, &config_path);
        let manifest =
            Manifest::generate(&trust_roots, &passphrase).map_err(|e| integrity_err(&e))?;
        manifest.save(&manifest_path).map_err(|e| integrity_err(&e))?;
        eprintln!(
            "manifest written: {} ({} entries)",
            manifest_path.display(),
            manifest.entries.len()
        );
        return Ok(());
    }

    let manifest = if manifest_path.exists() {
        let manifest = Manifest::load(&manifest_path).map_err(|e| integrity_err(&e))?;
        let passphrase = read_passphrase()?;
        manifest.verify(&passphrase).map_err(|e| integrity_err(&e))?;
        eprintln!("manifest verified: {} entries", manifest.entries.len());
        Some(manifest)
    } else if args.verify_only {
        return Err(BootFailure::Integrity(format!(
            "no manifest at {}",
            manifest_path.display()
        )));
    } else {
        tracing::warn!("no manifest present; booting without integrity verification");
        None
    };
    if args.verify_only {
        return Ok(());
    }

    if let (Some(expected), Some(configured)) =
        (&args.expected_model, &config.backend.expected_model)
        && expected != configured
    {
        return Err(config_err(format!(
            "expected model '{expected}' but config declares '{configured}'"
        )));
    }

    // Sandbox policy over canonical roots, trust roots write-denied.
    let mut policy = SandboxPolicy::new(roots).map_err(config_err)?;
    for cmd in &config.sandbox.extra_allowlist {
        policy.command_allowlist.insert(cmd.clone());
    }
    for cmd in &config.sandbox.extra_blocklist {
        policy.command_blocklist.insert(cmd.clone());
    }
    if args.strict_sandbox {
        for interpreter in INTERPRETERS {
            policy.command_allowlist.remove(*interpreter);
        }
    }
    policy.protect(&manifest_path);
    for path in &config.sandbox.protected_paths {
        policy.protect(path);
    }
    if let Some(manifest) = &manifest {
        for path in manifest.trust_roots() {
            policy.protect(path);
        }
    }

    let policy = Arc::new(policy);
    let paths = PathValidator::new(Arc::clone(&policy));
    let command_sandbox = CommandSandbox::new(paths.clone()).map_err(config_err)?;

    let mut env_extra = Vec::new();
    if let Some(endpoint_env) = &config.backend.endpoint_env {
        env_extra.push(endpoint_env.clone());
    }
    let binaries = BinaryPaths::capture(warden_integrity::DEFAULT_BINARIES);
    let env = EnvPolicy::new(&env_extra)
        .map_err(config_err)?
        .with_pinned_path(binaries.pinned_path());

    let mut registry = ToolRegistry::default();
    register_builtins(&mut registry).map_err(config_err)?;

    let mut arbiter = PermissionArbiter::new(Arc::new(TtyPrompt));
    for (tool, mode) in &config.permissions {
        arbiter.set_mode(tool.clone(), *mode);
    }
    arbiter.set_skip_prompts(args.dangerously_skip_permissions);
    if args.dangerously_skip_permissions && !std::io::stdin().is_terminal() {
        tracing::warn!("permission prompts skipped on a non-interactive stdin");
    }

    let audit = match &config.audit.path {
        Some(path) => AuditLog::open(path)
            .map_err(|e| config_err(format!("audit log {}: {e}", path.display())))?,
        None => AuditLog::disabled(),
    };
    audit.emit(&AuditEvent::new("boot").outcome(if manifest.is_some() {
        "verified"
    } else {
        "unverified"
    }));

    let dispatcher = Dispatcher::new(registry, arbiter, audit);
    let ctx = ToolCtx {
        working_dir: policy.working_dir().to_path_buf(),
        paths,
        command_sandbox,
        env,
        binaries,
        limits: ExecLimits {
            wall_clock: std::time::Duration::from_millis(config.limits.shell_timeout_ms),
            cpu_seconds: config.limits.shell_timeout_ms.div_ceil(1000),
            max_output_bytes: config.limits.max_output_bytes,
        },
        max_read_lines: config.limits.max_read_lines,
        trust: TrustRegistry::default(),
        backups: Arc::new(Mutex::new(BackupStore::new())),
    };

    Session::new(dispatcher, ctx).run().map_err(config_err)
}

/// Trust roots covered by the manifest: the runtime binary itself, the
/// config file, and every operator-declared protected path.
fn default_trust_roots(config: &RuntimeConfig, config_path: &std::path::Path) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        roots.push(exe);
    }
    if config_path.exists() {
        roots.push(config_path.to_path_buf());
    }
    roots.extend(config.sandbox.protected_paths.iter().cloned());
    roots
}

/// Passphrase from the environment, or prompted when stdin is a terminal.
/// Never stored anywhere.
fn read_passphrase() -> Result<String, BootFailure> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        if passphrase.is_empty() {
            return Err(BootFailure::PermissionRefused(format!(
                "{PASSPHRASE_ENV} is set but empty"
            )));
        }
        return Ok(passphrase);
    }
    if !std::io::stdin().is_terminal() {
        return Err(BootFailure::PermissionRefused(format!(
            "no {PASSPHRASE_ENV} and stdin is not a terminal"
        )));
    }
    eprint!("manifest passphrase: ");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| BootFailure::PermissionRefused(e.to_string()))?;
    let passphrase = line.trim_end_matches(['\r', '\n']).to_string();
    if passphrase.is_empty() {
        return Err(BootFailure::PermissionRefused(
            "empty passphrase".to_string(),
        ));
    }
    Ok(passphrase)
}
