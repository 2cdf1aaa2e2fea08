//! Manifest generation and verification.

use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::IntegrityError;

pub const MANIFEST_VERSION: u32 = 1;
pub const PBKDF2_ITERATIONS: u32 = 200_000;
const SALT_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// One trust-root file and its digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub sha256: String,
}

/// The on-disk manifest.
///
/// The HMAC covers the canonical serialization of `entries` ordered
/// lexicographically by path; the passphrase itself is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_utc: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
    pub salt: String,
    pub iterations: u32,
    pub hmac: String,
}

impl Manifest {
    /// Digest every trust-root file and sign the entry list.
    pub fn generate(trust_roots: &[PathBuf], passphrase: &str) -> Result<Self, IntegrityError> {
        let mut entries = Vec::with_capacity(trust_roots.len());
        for path in trust_roots {
            let digest = file_sha256(path)?;
            entries.push(ManifestEntry {
                path: path.to_string_lossy().into_owned(),
                sha256: hex_encode(&digest),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut salt = [0u8; SALT_LEN];
        rand::Rng::fill_bytes(&mut rand::rng(), &mut salt);

        let tag = sign_entries(&entries, passphrase, &salt, PBKDF2_ITERATIONS)?;
        Ok(Self {
            version: MANIFEST_VERSION,
            created_utc: Utc::now(),
            entries,
            salt: BASE64.encode(salt),
            iterations: PBKDF2_ITERATIONS,
            hmac: BASE64.encode(tag),
        })
    }

    /// Recompute digests and the tag; fail on the first divergence.
    ///
    /// The tag comparison is constant-time. File digests are checked before
    /// the tag so a tamper report can name the offending file.
    pub fn verify(&self, passphrase: &str) -> Result<(), IntegrityError> {
        let salt = BASE64
            .decode(&self.salt)
            .map_err(|e| IntegrityError::Malformed {
                message: format!("salt: {e}"),
            })?;
        let stored_tag = BASE64
            .decode(&self.hmac)
            .map_err(|e| IntegrityError::Malformed {
                message: format!("hmac: {e}"),
            })?;

        let tag = sign_entries(&self.entries, passphrase, &salt, self.iterations)?;
        if !bool::from(tag.ct_eq(stored_tag.as_slice())) {
            return Err(IntegrityError::BadTag);
        }

        for entry in &self.entries {
            let path = PathBuf::from(&entry.path);
            if !path.exists() {
                return Err(IntegrityError::MissingTrustRoot { path });
            }
            let digest = file_sha256(&path)?;
            if hex_encode(&digest) != entry.sha256 {
                return Err(IntegrityError::DigestMismatch { path });
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IntegrityError> {
        let bytes = std::fs::read(path).map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|e| IntegrityError::Malformed {
                message: e.to_string(),
            })?;
        if manifest.version != MANIFEST_VERSION {
            return Err(IntegrityError::Malformed {
                message: format!("unsupported manifest version {}", manifest.version),
            });
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), IntegrityError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| IntegrityError::Malformed {
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Paths covered by this manifest.
    #[must_use]
    pub fn trust_roots(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| PathBuf::from(&e.path)).collect()
    }
}

/// HMAC tag over the canonical (sorted, compact-JSON) entry list.
fn sign_entries(
    entries: &[ManifestEntry],
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; 32], IntegrityError> {
    let mut sorted: Vec<&ManifestEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    let canonical = serde_json::to_vec(&sorted).map_err(|e| IntegrityError::Malformed {
        message: e.to_string(),
    })?;

    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| IntegrityError::Malformed {
        message: e.to_string(),
    })?;
    mac.update(&canonical);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&tag);
    Ok(out)
}

fn file_sha256(path: &Path) -> Result<[u8; 32], IntegrityError> {
    let mut file = std::fs::File::open(path).map_err(|source| IntegrityError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(|source| IntegrityError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(out)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
