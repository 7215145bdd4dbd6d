//! The command-line surface (`spec.md` §6 "EXTERNAL INTERFACES"). Command
//! names and the flags the core depends on are authoritative; this module
//! only parses and validates arguments, leaving every operation to
//! [`crate::vault::VaultService`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pass-cli",
    author,
    version,
    about = "A local, single-user credential vault.",
    long_about = "pass-cli keeps service credentials in a single encrypted file on disk, \
                   with optional OS-keyring unlock, BIP-39 recovery, and a tamper-evident \
                   audit log."
)]
pub struct Cli {
    /// Path to the YAML config file. Overrides `$PASS_CLI_CONFIG` and the
    /// default `<home>/.pass-cli/config.yml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON instead of plain text.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new vault at the configured path.
    Init(InitArgs),
    /// Add a new credential.
    Add(AddArgs),
    /// Retrieve a credential.
    Get(GetArgs),
    /// List every service name stored in the vault.
    List,
    /// Update one or more fields of an existing credential.
    Update(UpdateArgs),
    /// Delete a credential.
    Delete(DeleteArgs),
    /// Change the vault's master password.
    ChangePassword(ChangePasswordArgs),
    /// Vault-wide maintenance operations.
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },
    /// OS-keyring integration.
    Keychain {
        #[command(subcommand)]
        action: KeychainAction,
    },
    /// Recompute and check the audit log's HMAC chain.
    VerifyAudit,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Skip BIP-39 recovery setup.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_recovery: bool,
    /// Store the master password in the OS keyring immediately after init.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub use_keychain: bool,
    /// Persist `audit_enabled = false` in the side-file.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_audit: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub service: String,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    pub service: String,
    /// Restrict output to a single field and record it in usage telemetry.
    #[arg(long, value_name = "NAME")]
    pub field: Option<String>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub service: String,
    /// Bypass the usage-confirmation prompt for a recently-accessed credential.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub service: String,
    /// Bypass the usage-confirmation prompt for a recently-accessed credential.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ChangePasswordArgs {
    /// Use the recovery flow (challenge words) instead of the current password.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub recover: bool,
}

#[derive(Debug, Subcommand)]
pub enum VaultAction {
    /// Convert a v1 (legacy) vault to the v2 envelope format.
    Migrate,
    /// Permanently delete the vault, its backups, side-file, and audit log.
    Remove {
        /// Skip the confirmation prompt.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        yes: bool,
    },
    /// Manual backup management.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum BackupAction {
    /// Snapshot the current vault file.
    Create,
    /// Restore from the newest valid backup.
    Restore,
    /// List known backups.
    Info,
}

#[derive(Debug, Subcommand)]
pub enum KeychainAction {
    /// Store the master password in the OS keyring.
    Enable {
        /// Overwrite an existing keyring entry.
        #[arg(long, action = clap::ArgAction::SetTrue)]
        force: bool,
    },
    /// Report whether keyring-based unlock is enabled and reachable.
    Status,
}
