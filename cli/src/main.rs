//! Warden CLI - boot surface and stdio session loop.
//!
//! stdout carries framed tool results only; logs go to a file and boot
//! diagnostics to stderr, so the protocol stream stays parseable.
//!
//! Exit codes: 0 normal, 2 integrity failure, 3 configuration error,
//! 4 permission refusal at boot.

mod boot;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const EXIT_INTEGRITY: u8 = 2;
const EXIT_CONFIG: u8 = 3;
const EXIT_PERMISSION: u8 = 4;

#[derive(Debug, Parser)]
#[command(name = "warden", about = "Security-enforcing runtime core for a local coding agent")]
struct Args {
    /// Compute the trust-root manifest and exit.
    #[arg(long)]
    generate_manifest: bool,

    /// Verify the manifest and exit without serving.
    #[arg(long)]
    verify_only: bool,

    /// Refuse to serve unless the configured model id matches.
    #[arg(long, value_name = "id")]
    expected_model: Option<String>,

    /// Drop interpreters from the command allowlist.
    #[arg(long)]
    strict_sandbox: bool,

    /// Explicit plugins directory; plugins are never auto-loaded.
    #[arg(long, value_name = "path")]
    plugins_dir: Option<PathBuf>,

    /// Promote every 'ask' tool to 'allow'. Never promotes 'deny'.
    #[arg(long)]
    dangerously_skip_permissions: bool,

    /// Config file; defaults to ./warden.toml.
    #[arg(long, value_name = "path")]
    config: Option<PathBuf>,

    /// Sandbox root (repeatable); defaults to the current directory.
    #[arg(long, value_name = "dir")]
    root: Vec<PathBuf>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warden")
        .join("logs");
    if std::fs::create_dir_all(&log_dir).is_ok()
        && let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("warden.log"))
    {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .with(env_filter)
            .init();
        return;
    }

    // No log file, no logs: stdout carries protocol frames and stderr is
    // for boot diagnostics only.
    tracing_subscriber::registry().with(env_filter).init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match boot::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            eprintln!("warden: {failure}");
            ExitCode::from(match failure {
                boot::BootFailure::Integrity(_) => EXIT_INTEGRITY,
                boot::BootFailure::Config(_) => EXIT_CONFIG,
                boot::BootFailure::PermissionRefused(_) => EXIT_PERMISSION,
            })
        }
    }
}
