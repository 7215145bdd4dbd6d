//! Vault file IO primitives (`spec.md` §4.2, §5).
//!
//! Goals, unchanged from the teacher's `vault::io`:
//! - Restrictive file permissions (0600) for vault, side-file, and lock
//!   files.
//! - Safe concurrent usage via advisory file locks (shared for readers,
//!   exclusive for the single writer, §5 / I6).
//! - Crash-safe writes via the write-temp, fsync, atomic-rename pattern.
//!
//! This module is format-agnostic: it moves raw bytes around and leaves
//! parsing/decoding to callers, which is also why the six-step write
//! protocol in `spec.md` §4.2 takes a validator closure instead of baking in
//! knowledge of the envelope JSON shape — the same protocol backs both the
//! vault envelope and the metadata side-file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    pub fn acquire(lock_path: &Path, mode: LockMode) -> Result<Self, VaultIoError> {
        ensure_parent_dir(lock_path)?;

        #[cfg(unix)]
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(lock_path)?;

        #[cfg(not(unix))]
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(lock_path)?;

        set_permissions_0600(lock_path)?;
        lock_file(&file, mode)?;
        Ok(Self { file })
    }
}

#[derive(Debug, Error)]
pub enum VaultIoError {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("unsupported platform for file locking")]
    UnsupportedPlatform,

    #[error("vault is locked by another process")]
    Busy,

    #[error("vault path has no parent directory")]
    NoParentDir,

    #[error("no usable backup was found")]
    NoUsableBackup,

    #[error("written file failed post-write verification")]
    VerificationFailed,
}

pub fn lock_path_for(path: &Path) -> PathBuf {
    append_suffix(path, ".lock")
}

pub fn backup_path_for(vault_path: &Path) -> PathBuf {
    append_suffix(vault_path, ".backup")
}

pub fn manual_backup_path_for(vault_path: &Path, unix_seconds: u64) -> PathBuf {
    let dir = vault_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = vault_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("vault.enc");
    dir.join(format!("{file_name}.{unix_seconds}.manual.backup"))
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Read raw bytes from `path`, taking a shared lock for the duration.
pub fn read_locked(path: &Path) -> Result<Vec<u8>, VaultIoError> {
    let _lock = FileLock::acquire(&lock_path_for(path), LockMode::Shared)?;
    read_bytes(path)
}

pub fn read_bytes(path: &Path) -> Result<Vec<u8>, VaultIoError> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// The six-step atomic write protocol from `spec.md` §4.2.
///
/// `validate` re-parses the bytes written to the temp file and returns
/// `true` if they are acceptable; on `false` the temp file is unlinked and
/// the previous `path`/`path.backup` pair is left completely untouched.
pub fn write_atomic_with_backup(
    path: &Path,
    bytes: &[u8],
    validate: impl Fn(&[u8]) -> bool,
) -> Result<(), VaultIoError> {
    let _lock = FileLock::acquire(&lock_path_for(path), LockMode::Exclusive)?;
    write_atomic_with_backup_locked(path, bytes, validate)
}

/// Same as [`write_atomic_with_backup`] but assumes the caller already
/// holds the exclusive lock (used by higher layers that read-modify-write
/// under a single lock acquisition to avoid TOCTOU between read and write).
pub fn write_atomic_with_backup_locked(
    path: &Path,
    bytes: &[u8],
    validate: impl Fn(&[u8]) -> bool,
) -> Result<(), VaultIoError> {
    ensure_parent_dir(path)?;
    let dir = path.parent().ok_or(VaultIoError::NoParentDir)?;

    // Step 1/2: write to a uniquely named temp file, fsync it.
    let tmp_path = temp_path_for(path);
    {
        #[cfg(unix)]
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&tmp_path)?;
        #[cfg(not(unix))]
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        tmp_file.write_all(bytes)?;
        tmp_file.sync_all()?;
    }
    set_permissions_0600(&tmp_path)?;

    // Step 3: re-open and verify.
    let verify_bytes = match read_bytes(&tmp_path) {
        Ok(b) => b,
        Err(err) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
    };
    if !validate(&verify_bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(VaultIoError::VerificationFailed);
    }

    // Step 4: rotate the existing vault file to `.backup`.
    let backup = backup_path_for(path);
    if path.exists() {
        #[cfg(windows)]
        {
            if backup.exists() {
                fs::remove_file(&backup)?;
            }
        }
        fs::rename(path, &backup)?;
    }

    // Step 5: rename temp into place.
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    set_permissions_0600(path)?;

    // Step 6: fsync the enclosing directory.
    fsync_dir(dir)?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let suffix = hex_encode(&crypto::random_bytes::<8>());
    append_suffix(path, &format!(".tmp.{suffix}"))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Create a user-requested manual backup of the current vault file.
pub fn create_manual_backup(vault_path: &Path, unix_seconds: u64) -> Result<PathBuf, VaultIoError> {
    let _lock = FileLock::acquire(&lock_path_for(vault_path), LockMode::Shared)?;
    let bytes = read_bytes(vault_path)?;
    let dest = manual_backup_path_for(vault_path, unix_seconds);
    fs::write(&dest, &bytes)?;
    set_permissions_0600(&dest)?;
    Ok(dest)
}

/// List all backups for `vault_path` (the automatic `.backup` plus every
/// `.*.manual.backup`), newest-first by filesystem mtime.
pub fn list_backups(vault_path: &Path) -> Vec<PathBuf> {
    let mut backups = Vec::new();

    let auto = backup_path_for(vault_path);
    if auto.exists() {
        backups.push(auto);
    }

    if let Some(dir) = vault_path.parent() {
        let prefix = vault_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(&prefix) && name.ends_with(".manual.backup") {
                    backups.push(entry.path());
                }
            }
        }
    }

    backups.sort_by_key(|p| {
        fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });
    backups.reverse();
    backups
}

/// Restore `vault_path` from the newest backup that passes `validate`,
/// trying older backups on failure. Leaves `vault_path` untouched if no
/// backup validates.
pub fn restore_from_backup(
    vault_path: &Path,
    validate: impl Fn(&[u8]) -> bool,
) -> Result<PathBuf, VaultIoError> {
    let _lock = FileLock::acquire(&lock_path_for(vault_path), LockMode::Exclusive);
    for candidate in list_backups(vault_path) {
        if let Ok(bytes) = read_bytes(&candidate) {
            if validate(&bytes) {
                write_atomic_with_backup_locked(vault_path, &bytes, &validate)?;
                return Ok(candidate);
            }
        }
    }
    Err(VaultIoError::NoUsableBackup)
}

/// Delete the vault file and every known backup/temp artifact.
pub fn remove_all(vault_path: &Path) -> Result<(), VaultIoError> {
    let _ = fs::remove_file(vault_path);
    let _ = fs::remove_file(backup_path_for(vault_path));
    for backup in list_backups(vault_path) {
        let _ = fs::remove_file(backup);
    }
    let _ = fs::remove_file(lock_path_for(vault_path));
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<(), VaultIoError> {
    let parent = path.parent().ok_or(VaultIoError::NoParentDir)?;
    fs::create_dir_all(parent)?;
    Ok(())
}

fn set_permissions_0600(path: &Path) -> Result<(), VaultIoError> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

fn fsync_dir(dir: &Path) -> Result<(), VaultIoError> {
    #[cfg(unix)]
    {
        let file = File::open(dir)?;
        file.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

fn lock_file(file: &File, mode: LockMode) -> Result<(), VaultIoError> {
    #[cfg(unix)]
    unsafe {
        let op = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX | libc::LOCK_NB,
        };

        let rc = libc::flock(file.as_raw_fd(), op);
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock {
            return Err(VaultIoError::Busy);
        }
        return Err(VaultIoError::Io(err));
    }

    #[cfg(not(unix))]
    {
        let _ = file;
        let _ = mode;
        Err(VaultIoError::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn atomic_write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");

        write_atomic_with_backup(&path, b"first", |_| true).unwrap();
        assert_eq!(read_bytes(&path).unwrap(), b"first");
        assert!(!backup_path_for(&path).exists());

        write_atomic_with_backup(&path, b"second", |_| true).unwrap();
        assert_eq!(read_bytes(&path).unwrap(), b"second");
        assert_eq!(read_bytes(&backup_path_for(&path)).unwrap(), b"first");

        #[cfg(unix)]
        {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn failed_validation_leaves_previous_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");

        write_atomic_with_backup(&path, b"good", |_| true).unwrap();
        let err = write_atomic_with_backup(&path, b"bad", |_| false).unwrap_err();
        assert!(matches!(err, VaultIoError::VerificationFailed));

        assert_eq!(read_bytes(&path).unwrap(), b"good");
        assert!(!backup_path_for(&path).exists());

        let leftover_tmp = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().contains(".tmp."));
        assert!(!leftover_tmp, "no temp file should remain after failure");
    }

    #[test]
    fn manual_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");

        write_atomic_with_backup(&path, b"v1", |_| true).unwrap();
        let manual = create_manual_backup(&path, 1_700_000_000).unwrap();
        assert!(manual.to_string_lossy().ends_with(".manual.backup"));

        write_atomic_with_backup(&path, b"v2-corrupt", |_| true).unwrap();

        // restore prefers newest usable backup; force the `.backup` (v1) to
        // fail validation so it falls through to the manual backup.
        let restored = restore_from_backup(&path, |b| b == b"v1").unwrap();
        assert_eq!(restored, manual);
        assert_eq!(read_bytes(&path).unwrap(), b"v1");
    }

    #[test]
    fn restore_reports_no_usable_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");
        write_atomic_with_backup(&path, b"v1", |_| true).unwrap();

        let err = restore_from_backup(&path, |_| false).unwrap_err();
        assert!(matches!(err, VaultIoError::NoUsableBackup));
        assert_eq!(read_bytes(&path).unwrap(), b"v1");
    }

    #[test]
    fn concurrent_writers_serialize_without_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("vault.enc"));
        write_atomic_with_backup(&path, b"seed", |_| true).unwrap();

        let writer = |byte: u8| {
            let path = path.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let payload = vec![byte; 4096];
                    write_atomic_with_backup(&path, &payload, |_| true).unwrap();
                    let read = read_locked(&path).unwrap();
                    let first = read[0];
                    assert!(read.iter().all(|b| *b == first));
                }
            })
        };

        let t1 = writer(b'x');
        let t2 = writer(b'y');
        t1.join().unwrap();
        t2.join().unwrap();

        let final_bytes = read_bytes(&path).unwrap();
        assert!(final_bytes.iter().all(|b| *b == b'x') || final_bytes.iter().all(|b| *b == b'y'));
    }
}
