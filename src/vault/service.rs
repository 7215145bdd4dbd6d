//! The vault service (`spec.md` §4.4): the Locked/Unlocked/Removed state
//! machine and the credential CRUD + usage-telemetry operations that run
//! against the in-memory plaintext once unlocked.
//!
//! This is the top-level component that composes every other `vault::*`
//! module: [`crate::vault::envelope`]/[`crate::vault::io`] for the on-disk
//! envelope, [`crate::vault::keys`]/[`crate::vault::recovery`] for unlock and
//! password changes, [`crate::vault::metadata`] for the side-file and
//! keyring, and [`crate::vault::audit`] for the tamper-evident log. Grounded
//! on the teacher's `vault::ops` lock-acquire-then-read-then-mutate-then-
//! seal-then-write shape, generalized to the service-name-keyed credential
//! model and the explicit lock state machine `spec.md` §4.4 requires.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use thiserror::Error;

use crate::crypto::{CryptoError, KdfParams, SecretBytes};
use crate::vault::audit::{self, EventType, Outcome};
use crate::vault::credential::{Credential, VaultPlaintext};
use crate::vault::envelope::{self, Envelope, VERSION_V1, VERSION_V2};
use crate::vault::io::{self, VaultIoError};
use crate::vault::keys::{self, KeyError};
use crate::vault::metadata::{self, MetadataError, SideFile};
use crate::vault::recovery::{self, RecoveryError};

const VAULT_ENV: &str = "PASS_CLI_VAULT";
const APP_DIR: &str = ".pass-cli";
const DEFAULT_VAULT_FILE: &str = "vault.enc";

/// The full error taxonomy from `spec.md` §7. Deliberately flat (not nested
/// per-subsystem) because every call site the CLI boundary cares about
/// dispatches on this one enum to pick an exit code (`exit_codes.rs`).
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("wrong password")]
    WrongPassword,

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("a credential for '{0}' already exists")]
    DuplicateService(String),

    #[error("vault already exists at {0}")]
    AlreadyExists(String),

    #[error("password must be at least 12 characters")]
    WeakPassword,

    #[error("keyring is unavailable")]
    KeyringUnavailable,

    #[error("keyring-based unlock is not enabled for this vault")]
    KeyringNotEnabled,

    #[error("recovery is not enabled for this vault")]
    RecoveryNotEnabled,

    #[error("one or more challenge words are not valid recovery words")]
    InvalidChallengeWord,

    #[error("challenge words did not unlock the vault")]
    WrongChallenge,

    #[error("vault data is corrupt")]
    Corrupt,

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("vault is locked by another process")]
    Busy,

    #[error("vault is not unlocked")]
    NotUnlocked,

    #[error("vault has been removed")]
    Removed,

    #[error("unable to determine vault directory")]
    VaultDirUnavailable,
}

impl From<VaultIoError> for VaultError {
    fn from(err: VaultIoError) -> Self {
        match err {
            VaultIoError::Busy => VaultError::Busy,
            VaultIoError::NoUsableBackup | VaultIoError::VerificationFailed => {
                VaultError::Corrupt
            }
            other => VaultError::Io(std::io::Error::other(other)),
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(_: CryptoError) -> Self {
        VaultError::WrongPassword
    }
}

impl From<KeyError> for VaultError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::WrongPassword => VaultError::WrongPassword,
            KeyError::Crypto(_) => VaultError::WrongPassword,
        }
    }
}

impl From<RecoveryError> for VaultError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::InvalidChallengeWord => VaultError::InvalidChallengeWord,
            RecoveryError::WrongChallenge => VaultError::WrongChallenge,
            RecoveryError::Crypto(_) => VaultError::WrongChallenge,
        }
    }
}

impl From<envelope::VaultFormatError> for VaultError {
    fn from(_: envelope::VaultFormatError) -> Self {
        VaultError::Corrupt
    }
}

impl From<MetadataError> for VaultError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Io(io_err) => io_err.into(),
            MetadataError::KeyringUnavailable => VaultError::KeyringUnavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Locked,
    Unlocked,
    Removed,
}

/// Options accepted by [`VaultService::initialize`] (§4.4's `initialize`
/// table row).
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub enable_recovery: bool,
    pub recovery_passphrase: Option<SecretString>,
    pub audit_enabled: bool,
}

/// Mutable field updates accepted by [`VaultService::update_credential`].
/// Every field is independently optional so the caller only touches the
/// ones the operator supplied.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub url: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

/// A credential, plus the transient per-location usage snapshot, as handed
/// back to a caller. Never serialized to the audit log or side-file (I5).
#[derive(Debug, Clone)]
pub struct CredentialView {
    pub service: String,
    pub username: String,
    pub password: SecretString,
    pub url: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    /// Count of distinct locations this credential has been fetched from;
    /// the CLI collaborator uses this to decide whether an update/delete
    /// needs the usage-confirmation prompt (§6 `--force`).
    pub usage_location_count: usize,
}

impl From<&Credential> for CredentialView {
    fn from(c: &Credential) -> Self {
        Self {
            service: c.service.clone(),
            username: c.username.clone(),
            password: c.password.clone(),
            url: c.url.clone(),
            category: c.category.clone(),
            notes: c.notes.clone(),
            usage_location_count: c.usage.len(),
        }
    }
}

/// The result of a successful `initialize` call: the mnemonic is returned
/// exactly once and must never be persisted by the core (§4.3).
pub struct InitResult {
    pub recovery_mnemonic: Option<Vec<String>>,
}

/// Snapshot returned by [`VaultService::keychain_status`].
#[derive(Debug, Clone, Copy)]
pub struct KeychainStatus {
    pub enabled: bool,
    pub keyring_reachable: bool,
}

pub struct VaultService {
    vault_path: PathBuf,
    vault_dir: PathBuf,
    vault_id: String,
    kdf_params: KdfParams,
    state: VaultState,
    dek: Option<SecretBytes>,
    plaintext: Option<VaultPlaintext>,
    envelope: Option<Envelope>,
    side_file: Option<SideFile>,
}

/// Resolve the vault path: explicit override, then `$PASS_CLI_VAULT`, then
/// `<home>/.pass-cli/vault.enc` (§6 "Persisted state layout").
pub fn default_vault_path(override_path: Option<&Path>) -> Result<PathBuf, VaultError> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(VAULT_ENV) {
        return Ok(PathBuf::from(path));
    }
    let mut dir = dirs::home_dir().ok_or(VaultError::VaultDirUnavailable)?;
    dir.push(APP_DIR);
    dir.push(DEFAULT_VAULT_FILE);
    Ok(dir)
}

impl VaultService {
    pub fn new(vault_path: PathBuf) -> Self {
        let vault_dir = vault_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let vault_id = metadata::vault_id_for(&vault_path);
        Self {
            vault_path,
            vault_dir,
            vault_id,
            kdf_params: KdfParams::default(),
            state: VaultState::Locked,
            dek: None,
            plaintext: None,
            envelope: None,
            side_file: None,
        }
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    pub fn vault_id(&self) -> &str {
        &self.vault_id
    }

    /// Side-file/keyring state, readable without unlocking the vault
    /// (`keychain status` never needs the master password).
    pub fn keychain_status(&self) -> KeychainStatus {
        let side_file = metadata::load(&self.vault_path);
        let enabled = side_file.as_ref().is_some_and(|s| s.keychain_enabled);
        let keyring_reachable = metadata::load_master_password(&self.vault_id).is_ok();
        KeychainStatus {
            enabled,
            keyring_reachable,
        }
    }

    /// Recompute and check the audit log's HMAC chain (`verify-audit`).
    /// Does not require the vault to be unlocked — the HMAC key lives in the
    /// keyring, independent of the master password (§9).
    pub fn verify_audit(&self) -> Result<(audit::VerifyReport, Vec<audit::Mismatch>), VaultError> {
        let (key, rotated) = metadata::load_or_rotate_audit_key(&self.vault_id)?;
        if rotated {
            tracing::warn!(vault_id = %self.vault_id, "audit HMAC key missing; generated a fresh one");
            if let Err(err) = audit::append(
                &self.vault_dir,
                &key,
                &self.vault_id,
                EventType::AuditKeyRotated,
                Outcome::Success,
                serde_json::json!({}),
            ) {
                tracing::warn!(error = %err, "failed to record audit_key_rotated event");
            }
        }
        audit::verify(&self.vault_dir, &key).map_err(|err| VaultError::Io(std::io::Error::other(err)))
    }

    fn ensure_unlocked(&self) -> Result<(), VaultError> {
        match self.state {
            VaultState::Unlocked => Ok(()),
            VaultState::Removed => Err(VaultError::Removed),
            VaultState::Locked => Err(VaultError::NotUnlocked),
        }
    }

    fn audit_enabled(&self) -> bool {
        self.side_file.as_ref().is_some_and(|s| s.audit_enabled)
    }

    /// Short, stable error category for a failure audit entry (§4.6).
    fn failure_reason(err: &VaultError) -> &'static str {
        match err {
            VaultError::WrongPassword => "wrong_password",
            VaultError::NotFound(_) => "not_found",
            VaultError::DuplicateService(_) => "duplicate_service",
            VaultError::AlreadyExists(_) => "already_exists",
            VaultError::WeakPassword => "weak_password",
            VaultError::KeyringUnavailable => "keyring_unavailable",
            VaultError::KeyringNotEnabled => "keyring_not_enabled",
            VaultError::RecoveryNotEnabled => "recovery_not_enabled",
            VaultError::InvalidChallengeWord => "invalid_challenge_word",
            VaultError::WrongChallenge => "wrong_challenge",
            VaultError::Corrupt => "corrupt",
            VaultError::Io(_) => "io_error",
            VaultError::Busy => "busy",
            VaultError::NotUnlocked => "not_unlocked",
            VaultError::Removed => "removed",
            VaultError::VaultDirUnavailable => "vault_dir_unavailable",
        }
    }

    /// Append an audit entry if (and only if) audit is enabled for this
    /// vault. Failures are logged and swallowed (§7: "audit failures ...
    /// do not roll back the vault write").
    fn log(&self, event_type: EventType, outcome: Outcome, details: serde_json::Value) {
        if !self.audit_enabled() {
            return;
        }
        match metadata::load_or_rotate_audit_key(&self.vault_id) {
            Ok((key, rotated)) => {
                if rotated {
                    tracing::warn!(vault_id = %self.vault_id, "audit HMAC key missing; generated a fresh one");
                    if let Err(err) = audit::append(
                        &self.vault_dir,
                        &key,
                        &self.vault_id,
                        EventType::AuditKeyRotated,
                        Outcome::Success,
                        serde_json::json!({}),
                    ) {
                        tracing::warn!(error = %err, "failed to record audit_key_rotated event");
                    }
                }
                if let Err(err) = audit::append(
                    &self.vault_dir,
                    &key,
                    &self.vault_id,
                    event_type,
                    outcome,
                    details,
                ) {
                    tracing::warn!(error = %err, "failed to append audit log entry");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "audit log unavailable; continuing without audit entry");
            }
        }
    }

    fn read_envelope_with_fallback(&self) -> Result<Envelope, VaultError> {
        match io::read_locked(&self.vault_path) {
            Ok(bytes) => Ok(Envelope::parse(&bytes)?),
            Err(_) => {
                let backup = io::backup_path_for(&self.vault_path);
                let bytes = io::read_bytes(&backup).map_err(|_| VaultError::Corrupt)?;
                Ok(Envelope::parse(&bytes)?)
            }
        }
    }

    fn validator_for_version(expected: u16) -> impl Fn(&[u8]) -> bool {
        move |bytes: &[u8]| {
            Envelope::parse(bytes)
                .map(|e| e.metadata.version == expected)
                .unwrap_or(false)
        }
    }

    fn write_envelope(&mut self, envelope: Envelope) -> Result<(), VaultError> {
        let bytes = envelope.encode();
        let version = envelope.metadata.version;
        io::write_atomic_with_backup(&self.vault_path, &bytes, Self::validator_for_version(version))?;
        self.envelope = Some(envelope);
        Ok(())
    }

    /// Re-encrypt the in-memory plaintext under the current DEK and persist
    /// it (every credential mutation and usage-telemetry write goes through
    /// here, per §4.2/§4.4).
    fn persist_plaintext(&mut self) -> Result<(), VaultError> {
        let plaintext = self
            .plaintext
            .as_ref()
            .ok_or(VaultError::NotUnlocked)?
            .clone();
        let dek = self.dek.clone().ok_or(VaultError::NotUnlocked)?;
        let current = self.envelope.clone().ok_or(VaultError::NotUnlocked)?;

        let bytes = serde_json::to_vec(&plaintext).map_err(|_| VaultError::Corrupt)?;
        let resealed = keys::reseal(&current, &dek, &bytes)?;
        self.write_envelope(resealed)
    }

    // ---- §4.4 operations -------------------------------------------------

    pub fn initialize(
        &mut self,
        password: &SecretString,
        opts: InitOptions,
    ) -> Result<InitResult, VaultError> {
        if self.vault_path.exists() {
            return Err(VaultError::AlreadyExists(
                self.vault_path.display().to_string(),
            ));
        }
        if !keys::is_strong_enough(password) {
            return Err(VaultError::WeakPassword);
        }

        let plaintext = VaultPlaintext::new();
        let bytes = serde_json::to_vec(&plaintext).map_err(|_| VaultError::Corrupt)?;

        let dek = crate::crypto::generate_dek();
        let (recovery_metadata, mnemonic) = if opts.enable_recovery {
            let setup = recovery::setup_recovery(&dek, opts.recovery_passphrase.as_ref(), self.kdf_params)?;
            (Some(setup.metadata), Some(setup.mnemonic_words))
        } else {
            (None, None)
        };

        let (envelope, dek) = keys::seal_new_v2_with_dek(
            password,
            self.kdf_params,
            &bytes,
            dek,
            recovery_metadata,
        )?;

        self.write_envelope(envelope)?;
        self.plaintext = Some(plaintext);
        self.dek = Some(dek);
        self.state = VaultState::Unlocked;

        let side_file = SideFile::new(self.vault_id.clone(), opts.audit_enabled);
        metadata::save(&self.vault_path, &side_file)?;
        self.side_file = Some(side_file);

        self.log(EventType::VaultInit, Outcome::Success, serde_json::json!({}));

        Ok(InitResult {
            recovery_mnemonic: mnemonic,
        })
    }

    fn load_plaintext(&mut self, dek: SecretBytes, plaintext_bytes: &[u8]) -> Result<(), VaultError> {
        let mut plaintext: VaultPlaintext =
            serde_json::from_slice(plaintext_bytes).map_err(|_| VaultError::Corrupt)?;
        plaintext.refresh_all_path_exists();
        self.plaintext = Some(plaintext);
        self.dek = Some(dek);
        self.state = VaultState::Unlocked;
        Ok(())
    }

    pub fn unlock(&mut self, password: &SecretString) -> Result<(), VaultError> {
        self.side_file = metadata::load(&self.vault_path);
        self.log(EventType::VaultUnlock, Outcome::Attempt, serde_json::json!({}));

        let result = (|| -> Result<(), VaultError> {
            let envelope = self.read_envelope_with_fallback()?;
            let (dek, plaintext_bytes) = keys::unlock(&envelope, password)?;
            self.envelope = Some(envelope);
            self.load_plaintext(dek, &plaintext_bytes)
        })();

        match &result {
            Ok(()) => self.log(EventType::VaultUnlock, Outcome::Success, serde_json::json!({})),
            Err(_) => self.log(
                EventType::VaultUnlock,
                Outcome::Failure,
                serde_json::json!({"reason": "auth_failed"}),
            ),
        }
        result
    }

    pub fn unlock_with_keyring(&mut self) -> Result<(), VaultError> {
        let side_file = metadata::load(&self.vault_path);
        let enabled = side_file.as_ref().is_some_and(|s| s.keychain_enabled);
        self.side_file = side_file;
        if !enabled {
            return Err(VaultError::KeyringNotEnabled);
        }

        let password = metadata::load_master_password(&self.vault_id)?
            .ok_or(VaultError::KeyringUnavailable)?;
        self.unlock(&password)
    }

    pub fn recover(
        &mut self,
        challenge_words: &[String; envelope::CHALLENGE_WORD_COUNT],
        passphrase: Option<&SecretString>,
    ) -> Result<(), VaultError> {
        self.side_file = metadata::load(&self.vault_path);
        self.log(EventType::RecoveryUsed, Outcome::Attempt, serde_json::json!({}));

        let result = (|| -> Result<(), VaultError> {
            let envelope = self.read_envelope_with_fallback()?;
            if envelope.metadata.version != VERSION_V2 {
                return Err(VaultError::RecoveryNotEnabled);
            }
            let recovery_metadata = envelope
                .metadata
                .recovery
                .as_ref()
                .ok_or(VaultError::RecoveryNotEnabled)?;

            let dek = recovery::recover_dek(recovery_metadata, challenge_words, passphrase)?;

            let aad = envelope::aad_bytes(&envelope.metadata);
            let plaintext_bytes =
                crate::crypto::open(&dek, &envelope.metadata.nonce, &aad, &envelope.data)
                    .map_err(|_| VaultError::WrongChallenge)?;

            self.envelope = Some(envelope);
            self.load_plaintext(dek, &plaintext_bytes)
        })();

        match &result {
            Ok(()) => self.log(EventType::RecoveryUsed, Outcome::Success, serde_json::json!({})),
            Err(_) => self.log(
                EventType::RecoveryUsed,
                Outcome::Failure,
                serde_json::json!({"reason": "recovery_failed"}),
            ),
        }
        result
    }

    pub fn change_password(&mut self, new_password: &SecretString) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        if !keys::is_strong_enough(new_password) {
            return Err(VaultError::WeakPassword);
        }
        self.log(EventType::PasswordChange, Outcome::Attempt, serde_json::json!({}));

        let result = (|| -> Result<(), VaultError> {
            let current = self.envelope.clone().ok_or(VaultError::NotUnlocked)?;
            let dek = self.dek.clone().ok_or(VaultError::NotUnlocked)?;
            let changed = keys::change_password_v2(&current, &dek, new_password, self.kdf_params)?;
            self.write_envelope(changed)
        })();

        match &result {
            Ok(()) => self.log(EventType::PasswordChange, Outcome::Success, serde_json::json!({})),
            Err(err) => self.log(
                EventType::PasswordChange,
                Outcome::Failure,
                serde_json::json!({"reason": Self::failure_reason(err)}),
            ),
        }
        result
    }

    /// Migrate a v1 (legacy) vault to v2 (§4.3). Explicit operation, never
    /// automatic; a no-op on an already-v2 vault is rejected as an error by
    /// the caller (checked before `unlock`, so it works whether or not the
    /// service is currently unlocked).
    pub fn migrate_to_v2(&mut self, password: &SecretString) -> Result<(), VaultError> {
        let envelope = self.read_envelope_with_fallback()?;
        if envelope.metadata.version != VERSION_V1 {
            return Err(VaultError::AlreadyExists("vault is already v2".to_string()));
        }
        let (v2_envelope, dek) = keys::migrate_v1_to_v2(&envelope, password, self.kdf_params)?;
        self.write_envelope(v2_envelope)?;
        self.dek = Some(dek);
        Ok(())
    }

    pub fn list_credentials(&self) -> Result<Vec<String>, VaultError> {
        self.ensure_unlocked()?;
        let plaintext = self.plaintext.as_ref().ok_or(VaultError::NotUnlocked)?;
        Ok(plaintext.credentials.iter().map(|c| c.service.clone()).collect())
    }

    pub fn add_credential(
        &mut self,
        service: &str,
        username: &str,
        password: SecretString,
        url: Option<String>,
        category: Option<String>,
        notes: Option<String>,
    ) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        self.log(
            EventType::CredentialAdd,
            Outcome::Attempt,
            serde_json::json!({"service": service}),
        );

        let result = (|| -> Result<(), VaultError> {
            let plaintext = self.plaintext.as_mut().ok_or(VaultError::NotUnlocked)?;
            if plaintext.contains(service) {
                return Err(VaultError::DuplicateService(service.to_string()));
            }
            plaintext.credentials.push(Credential::new(
                service.to_string(),
                username.to_string(),
                password,
                url,
                category,
                notes,
            ));
            self.persist_plaintext()
        })();

        match &result {
            Ok(()) => self.log(
                EventType::CredentialAdd,
                Outcome::Success,
                serde_json::json!({"service": service}),
            ),
            Err(err) => self.log(
                EventType::CredentialAdd,
                Outcome::Failure,
                serde_json::json!({"service": service, "reason": Self::failure_reason(err)}),
            ),
        }
        result
    }

    /// `location`, when present, is the caller's absolute working
    /// directory: a usage row is recorded and persisted (§4.4 "Usage
    /// telemetry"). `field`, when present, is tallied in `field_counts`.
    pub fn get_credential(
        &mut self,
        service: &str,
        location: Option<&str>,
        field: Option<&str>,
    ) -> Result<CredentialView, VaultError> {
        self.ensure_unlocked()?;
        self.log(
            EventType::CredentialGet,
            Outcome::Attempt,
            serde_json::json!({"service": service}),
        );

        let result = (|| -> Result<CredentialView, VaultError> {
            {
                let plaintext = self.plaintext.as_ref().ok_or(VaultError::NotUnlocked)?;
                if !plaintext.contains(service) {
                    return Err(VaultError::NotFound(service.to_string()));
                }
            }

            if let Some(location) = location {
                let plaintext = self.plaintext.as_mut().ok_or(VaultError::NotUnlocked)?;
                let credential = plaintext.find_mut(service).expect("checked above");
                credential.record_usage(location, field);
                self.persist_plaintext()?;
            }

            let plaintext = self.plaintext.as_ref().ok_or(VaultError::NotUnlocked)?;
            let credential = plaintext.find(service).expect("checked above");
            Ok(CredentialView::from(credential))
        })();

        match &result {
            Ok(_) => self.log(
                EventType::CredentialGet,
                Outcome::Success,
                serde_json::json!({"service": service}),
            ),
            Err(err) => self.log(
                EventType::CredentialGet,
                Outcome::Failure,
                serde_json::json!({"service": service, "reason": Self::failure_reason(err)}),
            ),
        }
        result
    }

    pub fn update_credential(
        &mut self,
        service: &str,
        update: CredentialUpdate,
    ) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        self.log(
            EventType::CredentialUpdate,
            Outcome::Attempt,
            serde_json::json!({"service": service}),
        );

        let result = (|| -> Result<(), VaultError> {
            let plaintext = self.plaintext.as_mut().ok_or(VaultError::NotUnlocked)?;
            let credential = plaintext
                .find_mut(service)
                .ok_or_else(|| VaultError::NotFound(service.to_string()))?;

            if let Some(username) = update.username {
                credential.username = username;
            }
            if let Some(password) = update.password {
                credential.password = password;
            }
            if let Some(url) = update.url {
                credential.url = url;
            }
            if let Some(category) = update.category {
                credential.category = category;
            }
            if let Some(notes) = update.notes {
                credential.notes = notes;
            }
            credential.updated_at = chrono::Utc::now();

            self.persist_plaintext()
        })();

        match &result {
            Ok(()) => self.log(
                EventType::CredentialUpdate,
                Outcome::Success,
                serde_json::json!({"service": service}),
            ),
            Err(err) => self.log(
                EventType::CredentialUpdate,
                Outcome::Failure,
                serde_json::json!({"service": service, "reason": Self::failure_reason(err)}),
            ),
        }
        result
    }

    pub fn delete_credential(&mut self, service: &str) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        self.log(
            EventType::CredentialDelete,
            Outcome::Attempt,
            serde_json::json!({"service": service}),
        );

        let result = (|| -> Result<(), VaultError> {
            let plaintext = self.plaintext.as_mut().ok_or(VaultError::NotUnlocked)?;
            plaintext
                .remove(service)
                .ok_or_else(|| VaultError::NotFound(service.to_string()))?;
            self.persist_plaintext()
        })();

        match &result {
            Ok(()) => self.log(
                EventType::CredentialDelete,
                Outcome::Success,
                serde_json::json!({"service": service}),
            ),
            Err(err) => self.log(
                EventType::CredentialDelete,
                Outcome::Failure,
                serde_json::json!({"service": service, "reason": Self::failure_reason(err)}),
            ),
        }
        result
    }

    pub fn enable_keychain(&mut self, password: &SecretString, force: bool) -> Result<(), VaultError> {
        self.ensure_unlocked()?;
        let already = self.side_file.as_ref().is_some_and(|s| s.keychain_enabled);
        if already && !force {
            return Err(VaultError::AlreadyExists("keychain already enabled".to_string()));
        }

        metadata::store_master_password(&self.vault_id, password)?;

        let mut side_file = self
            .side_file
            .clone()
            .unwrap_or_else(|| SideFile::new(self.vault_id.clone(), self.audit_enabled()));
        side_file.keychain_enabled = true;
        metadata::save(&self.vault_path, &side_file)?;
        self.side_file = Some(side_file);

        self.log(EventType::KeychainEnable, Outcome::Success, serde_json::json!({}));
        Ok(())
    }

    /// Drop the in-memory DEK and plaintext. `SecretBytes`/`SecretString`
    /// zeroize their backing buffers on drop, so this alone satisfies I3/I4.
    pub fn lock(&mut self) {
        self.dek = None;
        self.plaintext = None;
        self.log(EventType::VaultLock, Outcome::Success, serde_json::json!({}));
        if self.state != VaultState::Removed {
            self.state = VaultState::Locked;
        }
    }

    /// Snapshot the current vault file as a manual backup (§6 persisted
    /// state layout: `vault.enc.<unix-seconds>.manual.backup`).
    pub fn backup_create(&self) -> Result<PathBuf, VaultError> {
        let unix_seconds = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(io::create_manual_backup(&self.vault_path, unix_seconds)?)
    }

    /// List known backups, newest first (automatic `.backup` plus every
    /// manual snapshot).
    pub fn backup_info(&self) -> Vec<PathBuf> {
        io::list_backups(&self.vault_path)
    }

    /// Restore the vault file from the newest backup that parses as a valid
    /// envelope. The service must be re-unlocked afterward.
    pub fn backup_restore(&mut self) -> Result<PathBuf, VaultError> {
        let restored = io::restore_from_backup(&self.vault_path, Self::validator_for_any_version())?;
        self.lock();
        Ok(restored)
    }

    fn validator_for_any_version() -> impl Fn(&[u8]) -> bool {
        |bytes: &[u8]| Envelope::parse(bytes).is_ok()
    }

    pub fn remove(&mut self) -> Result<(), VaultError> {
        self.side_file = metadata::load(&self.vault_path);
        self.log(
            EventType::VaultRemoveAttempt,
            Outcome::Attempt,
            serde_json::json!({}),
        );

        io::remove_all(&self.vault_path)?;
        metadata::delete(&self.vault_path);
        metadata::delete_master_password(&self.vault_id);

        self.log(EventType::VaultRemove, Outcome::Success, serde_json::json!({}));
        audit::delete(&self.vault_dir);
        metadata::delete_audit_key(&self.vault_id);

        self.lock();
        self.state = VaultState::Removed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn new_service() -> (tempfile::TempDir, VaultService) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enc");
        let mut service = VaultService::new(path);
        service.kdf_params = KdfParams::for_tests();
        (dir, service)
    }

    #[test]
    fn init_add_get_roundtrip() {
        let (_dir, mut service) = new_service();
        service
            .initialize(
                &pw("Test123!@#Pass"),
                InitOptions {
                    enable_recovery: false,
                    recovery_passphrase: None,
                    audit_enabled: true,
                },
            )
            .unwrap();

        service
            .add_credential("svc", "u", pw("p"), None, None, None)
            .unwrap();

        let path = service.vault_path().to_path_buf();
        let mut fresh = VaultService::new(path);
        fresh.kdf_params = KdfParams::for_tests();
        fresh.unlock(&pw("Test123!@#Pass")).unwrap();

        let view = fresh.get_credential("svc", None, None).unwrap();
        use secrecy::ExposeSecret;
        assert_eq!(view.username, "u");
        assert_eq!(view.password.expose_secret(), "p");
    }

    #[test]
    fn wrong_password_is_opaque() {
        let (_dir, mut service) = new_service();
        service
            .initialize(&pw("Correct123456"), InitOptions::default())
            .unwrap();
        service.lock();

        let err1 = service.unlock(&pw("Wrong1234567")).unwrap_err();
        let err2 = service.unlock(&pw("Correct12345X")).unwrap_err();
        assert_eq!(err1.to_string(), err2.to_string());
        assert!(matches!(err1, VaultError::WrongPassword));
    }

    #[test]
    fn recovery_then_password_change() {
        let (_dir, mut service) = new_service();
        let result = service
            .initialize(
                &pw("OriginalPass1"),
                InitOptions {
                    enable_recovery: true,
                    recovery_passphrase: None,
                    audit_enabled: false,
                },
            )
            .unwrap();
        let mnemonic = result.recovery_mnemonic.unwrap();
        service.lock();

        let envelope = service.read_envelope_with_fallback().unwrap();
        let positions = envelope.metadata.recovery.as_ref().unwrap().challenge_positions;
        let challenge_words: [String; envelope::CHALLENGE_WORD_COUNT] = positions
            .iter()
            .map(|&pos| mnemonic[pos as usize].clone())
            .collect::<Vec<_>>()
            .try_into()
            .unwrap();

        service.recover(&challenge_words, None).unwrap();
        service.change_password(&pw("NewPass123456")).unwrap();
        service.lock();

        assert!(service.unlock(&pw("NewPass123456")).is_ok());
        service.lock();
        assert!(service.unlock(&pw("OriginalPass1")).is_err());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let (_dir, mut service) = new_service();
        service
            .initialize(&pw("Correct123456"), InitOptions::default())
            .unwrap();
        service
            .add_credential("svc", "u", pw("p"), None, None, None)
            .unwrap();
        let err = service
            .add_credential("svc", "u2", pw("p2"), None, None, None)
            .unwrap_err();
        assert!(matches!(err, VaultError::DuplicateService(_)));
    }

    #[test]
    fn remove_deletes_vault_and_is_terminal() {
        let (_dir, mut service) = new_service();
        service
            .initialize(&pw("Correct123456"), InitOptions::default())
            .unwrap();
        let path = service.vault_path().to_path_buf();

        service.remove().unwrap();
        assert!(!path.exists());
        assert_eq!(service.state(), VaultState::Removed);
        assert!(matches!(
            service.add_credential("svc", "u", pw("p"), None, None, None),
            Err(VaultError::Removed)
        ));
    }

    #[test]
    fn weak_password_rejected_at_init() {
        let (_dir, mut service) = new_service();
        let err = service
            .initialize(&pw("short"), InitOptions::default())
            .unwrap_err();
        assert!(matches!(err, VaultError::WeakPassword));
    }

    #[test]
    fn usage_telemetry_persists_across_reopen() {
        let (_dir, mut service) = new_service();
        service
            .initialize(&pw("Correct123456"), InitOptions::default())
            .unwrap();
        service
            .add_credential("svc", "u", pw("p"), None, None, None)
            .unwrap();
        service.get_credential("svc", Some("/tmp"), Some("password")).unwrap();

        let path = service.vault_path().to_path_buf();
        let mut fresh = VaultService::new(path);
        fresh.kdf_params = KdfParams::for_tests();
        fresh.unlock(&pw("Correct123456")).unwrap();
        let plaintext = fresh.plaintext.as_ref().unwrap();
        let credential = plaintext.find("svc").unwrap();
        assert_eq!(credential.usage.get("/tmp").unwrap().access_count, 1);
    }
}
