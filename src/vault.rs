//! Vault discovery.
//!
//! A vault is any directory with a `.nota/` child containing a valid
//! `vault.json`. Discovery honors `NOTA_VAULT_ROOT` when it points at a
//! valid vault, otherwise walks upward from the working directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Directory that marks a vault root.
pub const VAULT_MARKER_DIR: &str = ".nota";

/// Configuration file within the marker directory.
pub const VAULT_CONFIG_FILE: &str = "vault.json";

/// Environment variable overriding vault root detection.
pub const ENV_VAULT_ROOT: &str = "NOTA_VAULT_ROOT";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("not in a vault")]
    NotInVault,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Check whether `path` is a valid vault root: `.nota/` must exist and
/// `.nota/vault.json` must parse as JSON.
pub fn is_vault(path: &Path) -> bool {
    let marker = path.join(VAULT_MARKER_DIR);
    if !marker.is_dir() {
        return false;
    }

    let config = marker.join(VAULT_CONFIG_FILE);
    match std::fs::read(&config) {
        Ok(data) => serde_json::from_slice::<serde_json::Value>(&data).is_ok(),
        Err(_) => false,
    }
}

/// Find the vault root for the current process.
///
/// `NOTA_VAULT_ROOT` takes precedence; if it is set but does not point at a
/// valid vault the lookup fails rather than falling back.
pub fn find_vault_root() -> Result<PathBuf, VaultError> {
    if let Ok(env_root) = std::env::var(ENV_VAULT_ROOT) {
        if !env_root.is_empty() {
            let abs = std::fs::canonicalize(&env_root).map_err(|_| VaultError::NotInVault)?;
            if is_vault(&abs) {
                return Ok(abs);
            }
            return Err(VaultError::NotInVault);
        }
    }

    let cwd = std::env::current_dir()?;
    find_vault_root_from(&cwd)
}

/// Walk upward from `start` looking for a vault marker.
pub fn find_vault_root_from(start: &Path) -> Result<PathBuf, VaultError> {
    let mut current = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };

    loop {
        if is_vault(&current) {
            return Ok(current);
        }
        if !current.pop() {
            return Err(VaultError::NotInVault);
        }
    }
}
