//! The credential vault: on-disk envelope format, key hierarchy, recovery,
//! metadata/keyring bridge, audit log, and the service that ties them
//! together (`spec.md` §3-§7).

pub mod audit;
pub mod credential;
pub mod envelope;
pub mod io;
pub mod keys;
pub mod metadata;
pub mod prompt;
pub mod recovery;
pub mod service;

pub use service::{
    default_vault_path, CredentialUpdate, CredentialView, InitOptions, InitResult, KeychainStatus,
    VaultError, VaultService, VaultState,
};

pub use prompt::{prompt_master_password, prompt_new_master_password, prompt_secret, PromptError};
