//! Boot integrity: HMAC-signed manifest over trust-root files.
//!
//! The manifest binds the sandbox core, tool protocol, arbitrator, and
//! memory files to a passphrase-derived key. Verification runs before the
//! runtime serves a single turn; a mismatch is fatal, not reportable.

mod binpath;
mod manifest;

pub use binpath::{BinaryPaths, DEFAULT_BINARIES};
pub use manifest::{Manifest, ManifestEntry, MANIFEST_VERSION, PBKDF2_ITERATIONS};

use std::path::PathBuf;

/// Integrity failures are boot-fatal.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("cannot read trust root {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("digest mismatch for trust root: {path}")]
    DigestMismatch { path: PathBuf },
    #[error("trust root listed in manifest is missing: {path}")]
    MissingTrustRoot { path: PathBuf },
    #[error("manifest HMAC tag does not verify")]
    BadTag,
    #[error("malformed manifest: {message}")]
    Malformed { message: String },
    #[error("binary not found on PATH at boot: {name}")]
    BinaryNotFound { name: String },
}
