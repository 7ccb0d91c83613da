//! SSH host-key discovery/generation (spec §6 "Persisted state: none,
//! except the SSH host key file, generated on first start if absent").
//!
//! Grounded on the teacher's `mcp_daemon::config::discover_certificate_paths`
//! (standard OS-specific data directory, created on demand) — swapped here
//! from a TLS cert/key pair to a single SSH host-key file, since this
//! daemon speaks plain HTTP, not HTTPS.

use std::path::{Path, PathBuf};

use russh_keys::key::KeyPair;

/// Default location when `--ssh-host-key` isn't given: the OS data
/// directory, matching the teacher's per-OS `dirs::data_local_dir()` /
/// `dirs::home_dir()` fallback chain.
pub fn default_host_key_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")))
        .join("workspaced")
        .join("ssh_host_ed25519")
}

/// Loads the host key at `path`, generating and persisting a fresh
/// ed25519 key if the file doesn't exist yet.
pub async fn load_or_generate(path: &Path) -> anyhow::Result<KeyPair> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let key = russh_keys::decode_secret_key(std::str::from_utf8(&bytes)?, None)?;
            log::info!("loaded SSH host key from {}", path.display());
            Ok(key)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("generating new SSH host key at {}", path.display());
            let key = KeyPair::generate_ed25519().ok_or_else(|| {
                anyhow::anyhow!("failed to generate ed25519 host key")
            })?;
            let pem = russh_keys::encode_pkcs8_pem(&key)?;
            tokio::fs::write(path, pem).await?;
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}
