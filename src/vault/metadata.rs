//! The metadata side-file and OS-keyring bridge (`spec.md` §4.5): the
//! contract that lets a fresh process know whether a vault "expects"
//! keyring-based unlock or audit logging, and the keyring lookups for the
//! master password and the audit HMAC key.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vault::io::{self, VaultIoError};

pub const SCHEMA_VERSION: &str = "1.0";

const KEYRING_SERVICE_MASTER: &str = "pass-cli";
const KEYRING_SERVICE_AUDIT: &str = "pass-cli-audit";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Io(#[from] VaultIoError),

    #[error("keyring unavailable")]
    KeyringUnavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideFile {
    pub schema: String,
    pub vault_id: String,
    pub audit_enabled: bool,
    pub keychain_enabled: bool,
}

impl SideFile {
    pub fn new(vault_id: String, audit_enabled: bool) -> Self {
        Self {
            schema: SCHEMA_VERSION.to_string(),
            vault_id,
            audit_enabled,
            keychain_enabled: false,
        }
    }
}

pub fn side_file_path(vault_path: &Path) -> PathBuf {
    let mut s = vault_path.as_os_str().to_os_string();
    s.push(".meta.json");
    PathBuf::from(s)
}

/// `vault_id` is the basename of the directory containing the vault file
/// (§4.5) — the same value is embedded in every audit entry.
pub fn vault_id_for(vault_path: &Path) -> String {
    vault_path
        .parent()
        .and_then(|dir| dir.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "default".to_string())
}

/// Load the side-file. Missing file: returns `None` (the caller treats this
/// as "no capability flags recorded yet", same as a fresh rebuild). Corrupt
/// JSON: logs a warning and returns `None` so the caller rebuilds with all
/// flags false (§4.5 graceful degradation), it is not an error.
pub fn load(vault_path: &Path) -> Option<SideFile> {
    let path = side_file_path(vault_path);
    let bytes = io::read_bytes(&path).ok()?;
    match serde_json::from_slice::<SideFile>(&bytes) {
        Ok(side_file) => Some(side_file),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "side-file is corrupt JSON; assuming no capability flags, will rebuild"
            );
            None
        }
    }
}

/// Rewrite the side-file atomically, mirroring the vault's own six-step
/// write protocol (§4.2) at a much smaller scale.
pub fn save(vault_path: &Path, side_file: &SideFile) -> Result<(), MetadataError> {
    let path = side_file_path(vault_path);
    let bytes = serde_json::to_vec_pretty(side_file).expect("side-file serializes");
    io::write_atomic_with_backup(&path, &bytes, |b| serde_json::from_slice::<SideFile>(b).is_ok())?;
    Ok(())
}

pub fn delete(vault_path: &Path) {
    let path = side_file_path(vault_path);
    let _ = std::fs::remove_file(path);
}

fn master_password_account(vault_id: &str) -> String {
    format!("master-password-{vault_id}")
}

/// Store the master password in the OS keyring under the master-password
/// namespace (§4.5).
pub fn store_master_password(vault_id: &str, password: &SecretString) -> Result<(), MetadataError> {
    use secrecy::ExposeSecret;
    let entry = keyring::Entry::new(KEYRING_SERVICE_MASTER, &master_password_account(vault_id))
        .map_err(|_| MetadataError::KeyringUnavailable)?;
    entry
        .set_password(password.expose_secret())
        .map_err(|_| MetadataError::KeyringUnavailable)
}

/// Fetch the cached master password, if the keyring has an entry for this
/// vault. `Ok(None)` means the keyring is reachable but has no entry;
/// `Err` means the keyring itself could not be reached.
pub fn load_master_password(vault_id: &str) -> Result<Option<SecretString>, MetadataError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE_MASTER, &master_password_account(vault_id))
        .map_err(|_| MetadataError::KeyringUnavailable)?;
    match entry.get_password() {
        Ok(password) => Ok(Some(SecretString::from(password))),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(_) => Err(MetadataError::KeyringUnavailable),
    }
}

pub fn delete_master_password(vault_id: &str) {
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE_MASTER, &master_password_account(vault_id)) {
        let _ = entry.delete_credential();
    }
}

/// Fetch (or, if the side-file says audit is enabled but the keyring entry
/// is missing, generate-and-store-then-return) the 32-byte audit HMAC key
/// for `vault_id`. Returns whether a fresh key was generated, so the caller
/// can append the `audit_key_rotated` event (§4.5, §4.6).
pub fn load_or_rotate_audit_key(vault_id: &str) -> Result<(Vec<u8>, bool), MetadataError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE_AUDIT, vault_id)
        .map_err(|_| MetadataError::KeyringUnavailable)?;

    match entry.get_password() {
        Ok(encoded) => {
            let key = base64_decode(&encoded)?;
            Ok((key, false))
        }
        Err(keyring::Error::NoEntry) => {
            let key = crate::crypto::random_bytes::<32>().to_vec();
            let encoded = base64_encode(&key);
            entry
                .set_password(&encoded)
                .map_err(|_| MetadataError::KeyringUnavailable)?;
            Ok((key, true))
        }
        Err(_) => Err(MetadataError::KeyringUnavailable),
    }
}

pub fn delete_audit_key(vault_id: &str) {
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE_AUDIT, vault_id) {
        let _ = entry.delete_credential();
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, MetadataError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| MetadataError::KeyringUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_id_is_parent_dir_basename() {
        let path = Path::new("/home/user/.pass-cli/vault.enc");
        assert_eq!(vault_id_for(path), ".pass-cli");
    }

    #[test]
    fn side_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        let side_file = SideFile::new("myvault".to_string(), true);
        save(&vault_path, &side_file).unwrap();

        let loaded = load(&vault_path).unwrap();
        assert_eq!(loaded.vault_id, "myvault");
        assert!(loaded.audit_enabled);
        assert!(!loaded.keychain_enabled);
    }

    #[test]
    fn missing_side_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        assert!(load(&vault_path).is_none());
    }

    #[test]
    fn corrupt_side_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        let path = side_file_path(&vault_path);
        std::fs::write(&path, b"not json").unwrap();
        assert!(load(&vault_path).is_none());
    }
}
