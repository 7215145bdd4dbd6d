//! Exit code mapping (`spec.md` §6): exactly three codes. `0` success, `1`
//! user-visible failure (wrong password, not found, cancelled), `2`
//! environmental failure (I/O, permission, keyring unavailable when
//! required, corrupted vault).

use std::process::ExitCode;

use crate::{config, vault};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_USER: u8 = 1;
pub const EXIT_ENVIRONMENT: u8 = 2;

pub fn exit_code_for_vault_error(error: &vault::VaultError) -> ExitCode {
    use vault::VaultError::*;

    match error {
        WrongPassword
        | NotFound(_)
        | DuplicateService(_)
        | AlreadyExists(_)
        | WeakPassword
        | KeyringNotEnabled
        | RecoveryNotEnabled
        | InvalidChallengeWord
        | WrongChallenge
        | NotUnlocked
        | Removed => ExitCode::from(EXIT_USER),

        Io(_) | Busy | KeyringUnavailable | Corrupt | VaultDirUnavailable => {
            ExitCode::from(EXIT_ENVIRONMENT)
        }
    }
}

pub fn exit_code_for_prompt_error(error: &vault::PromptError) -> ExitCode {
    use vault::PromptError::*;

    match error {
        Io(_) => ExitCode::from(EXIT_ENVIRONMENT),
        Empty | Mismatch => ExitCode::from(EXIT_USER),
    }
}

pub fn exit_code_for_config_error(error: &config::ConfigError) -> ExitCode {
    use config::ConfigError::*;

    match error {
        ConfigDirUnavailable | Io(_) | Parse(_) | Serialize(_) => {
            ExitCode::from(EXIT_ENVIRONMENT)
        }
    }
}
