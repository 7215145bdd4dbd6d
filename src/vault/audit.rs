//! The append-only audit log (`spec.md` §4.6): JSON-Lines events chained by
//! HMAC-SHA256 so that any alteration of a past entry is detectable without
//! needing the vault itself unlocked.
//!
//! Grounded on the teacher's `vault::io` fsync/lock discipline for the
//! append path (the advisory lock on the vault path is reused to serialize
//! appends, per §5) and on the `hmac`/`sha2` crates' `Hmac<Sha256>`/`Mac`
//! API for the chain itself.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::vault::io::{self, LockMode, VaultIoError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Io(#[from] VaultIoError),

    #[error("io error")]
    StdIo(#[from] std::io::Error),

    #[error("audit log entry is not valid JSON")]
    InvalidJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Attempt,
    Success,
    Failure,
}

/// Event types named in `spec.md` §4.6 "Event types" (minimum set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VaultInit,
    VaultUnlock,
    VaultLock,
    CredentialAdd,
    CredentialGet,
    CredentialUpdate,
    CredentialDelete,
    PasswordChange,
    RecoveryUsed,
    KeychainEnable,
    KeychainDisable,
    KeychainStatus,
    VaultRemoveAttempt,
    VaultRemove,
    AuditKeyRotated,
}

/// A fully decoded entry, as read back from the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub outcome: Outcome,
    pub vault_id: String,
    pub details: serde_json::Value,
    pub prev_hmac: String,
    pub hmac: String,
}

pub fn audit_log_path(vault_dir: &Path) -> PathBuf {
    vault_dir.join("audit.log")
}

/// Canonical field order for HMAC computation: fixed key order, compact
/// separators, `hmac` itself excluded (§4.6).
fn canonical_bytes(entry_without_hmac: &Entry) -> Vec<u8> {
    let value = serde_json::json!({
        "seq": entry_without_hmac.seq,
        "timestamp": entry_without_hmac.timestamp,
        "event_type": entry_without_hmac.event_type,
        "outcome": entry_without_hmac.outcome,
        "vault_id": entry_without_hmac.vault_id,
        "details": entry_without_hmac.details,
        "prev_hmac": entry_without_hmac.prev_hmac,
    });
    serde_json::to_vec(&value).expect("canonical entry serializes")
}

fn compute_hmac(key: &[u8], entry_without_hmac: &Entry) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&canonical_bytes(entry_without_hmac));
    hex_encode(&mac.finalize().into_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Read the last entry's `hmac`, or `""` if the log is empty/missing — the
/// `prev_hmac` the next appended entry must carry.
fn last_hmac(log_path: &Path) -> Result<(u64, String), AuditError> {
    if !log_path.exists() {
        return Ok((0, String::new()));
    }
    let file = std::fs::File::open(log_path)?;
    let reader = BufReader::new(file);
    let mut next_seq = 0u64;
    let mut prev = String::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: Entry = serde_json::from_str(&line).map_err(|_| AuditError::InvalidJson)?;
        next_seq = entry.seq + 1;
        prev = entry.hmac;
    }
    Ok((next_seq, prev))
}

/// Append one entry to the log. `hmac_key` is the 32-byte key from the
/// keyring's audit namespace (§4.5). Each append takes the same exclusive
/// lock used for vault mutations (§5) and `fsync`s before returning, so the
/// entry is durable by the time the caller's operation completes.
pub fn append(
    vault_dir: &Path,
    hmac_key: &[u8],
    vault_id: &str,
    event_type: EventType,
    outcome: Outcome,
    details: serde_json::Value,
) -> Result<Entry, AuditError> {
    let log_path = audit_log_path(vault_dir);
    let lock_path = io::lock_path_for(&log_path);
    let _lock = io::FileLock::acquire(&lock_path, LockMode::Exclusive)?;

    let (seq, prev_hmac) = last_hmac(&log_path)?;

    let mut entry = Entry {
        seq,
        timestamp: Utc::now(),
        event_type,
        outcome,
        vault_id: vault_id.to_string(),
        details,
        prev_hmac,
        hmac: String::new(),
    };
    entry.hmac = compute_hmac(hmac_key, &entry);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let mut line = serde_json::to_string(&entry).map_err(|_| AuditError::InvalidJson)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    file.sync_all()?;

    Ok(entry)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VerifyReport {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
}

/// One mismatch found during verification. Carries only `seq`, never the
/// offending content (§4.6 "reported with `seq` only").
#[derive(Debug, Clone, Copy)]
pub struct Mismatch {
    pub seq: u64,
}

/// Recompute every entry's HMAC and check the chain (§4.6, §8 property 4).
/// An empty or missing log is valid with `total = 0`.
pub fn verify(vault_dir: &Path, hmac_key: &[u8]) -> Result<(VerifyReport, Vec<Mismatch>), AuditError> {
    let log_path = audit_log_path(vault_dir);
    if !log_path.exists() {
        return Ok((
            VerifyReport {
                total: 0,
                valid: 0,
                invalid: 0,
            },
            Vec::new(),
        ));
    }

    let file = std::fs::File::open(&log_path)?;
    let reader = BufReader::new(file);

    let mut total = 0u64;
    let mut valid = 0u64;
    let mut mismatches = Vec::new();
    let mut expected_prev = String::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        total += 1;
        let entry: Entry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(_) => {
                mismatches.push(Mismatch { seq: total - 1 });
                continue;
            }
        };

        let recomputed = compute_hmac(hmac_key, &entry);
        let chain_ok = entry.prev_hmac == expected_prev;
        let hmac_ok = crate::crypto::ct_equal(recomputed.as_bytes(), entry.hmac.as_bytes());

        if chain_ok && hmac_ok {
            valid += 1;
        } else {
            mismatches.push(Mismatch { seq: entry.seq });
        }
        expected_prev = entry.hmac;
    }

    Ok((
        VerifyReport {
            total,
            valid,
            invalid: total - valid,
        },
        mismatches,
    ))
}

pub fn delete(vault_dir: &Path) {
    let log_path = audit_log_path(vault_dir);
    let _ = std::fs::remove_file(&log_path);
    let _ = std::fs::remove_file(io::lock_path_for(&log_path));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_chains_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let key = b"0123456789abcdef0123456789abcdef";

        append(
            dir.path(),
            key,
            "myvault",
            EventType::VaultInit,
            Outcome::Success,
            serde_json::json!({}),
        )
        .unwrap();
        append(
            dir.path(),
            key,
            "myvault",
            EventType::CredentialAdd,
            Outcome::Attempt,
            serde_json::json!({"service": "github"}),
        )
        .unwrap();
        append(
            dir.path(),
            key,
            "myvault",
            EventType::CredentialAdd,
            Outcome::Success,
            serde_json::json!({"service": "github"}),
        )
        .unwrap();

        let (report, mismatches) = verify(dir.path(), key).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.valid, 3);
        assert_eq!(report.invalid, 0);
        assert!(mismatches.is_empty());
    }

    #[test]
    fn tampered_entry_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let key = b"0123456789abcdef0123456789abcdef";
        for _ in 0..3 {
            append(
                dir.path(),
                key,
                "myvault",
                EventType::CredentialGet,
                Outcome::Success,
                serde_json::json!({"service": "x"}),
            )
            .unwrap();
        }

        let log_path = audit_log_path(dir.path());
        let contents = std::fs::read_to_string(&log_path).unwrap();
        let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
        let mut entry: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        entry["details"]["service"] = serde_json::json!("tampered");
        lines[1] = entry.to_string();
        std::fs::write(&log_path, lines.join("\n") + "\n").unwrap();

        let (report, mismatches) = verify(dir.path(), key).unwrap();
        assert_eq!(report.total, 3);
        assert!(report.valid < 3);
        assert!(mismatches.iter().any(|m| m.seq == 1));
    }

    #[test]
    fn empty_log_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let key = b"0123456789abcdef0123456789abcdef";
        let (report, mismatches) = verify(dir.path(), key).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.valid, 0);
        assert!(mismatches.is_empty());
    }

    #[test]
    fn seq_numbers_increase_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let key = b"0123456789abcdef0123456789abcdef";
        let e0 = append(
            dir.path(),
            key,
            "v",
            EventType::VaultInit,
            Outcome::Success,
            serde_json::json!({}),
        )
        .unwrap();
        let e1 = append(
            dir.path(),
            key,
            "v",
            EventType::VaultUnlock,
            Outcome::Success,
            serde_json::json!({}),
        )
        .unwrap();
        assert_eq!(e0.seq, 0);
        assert_eq!(e1.seq, 1);
        assert_eq!(e1.prev_hmac, e0.hmac);
    }
}
