use std::process::ExitCode;

use secrecy::SecretString;

use crate::app::AppContext;
use crate::cli::InitArgs;
use crate::commands::support::{emit, read_line, vault_error};
use crate::vault::{self, InitOptions, VaultService};

pub fn run(args: InitArgs, ctx: &AppContext) -> ExitCode {
    let password = match vault::prompt_new_master_password() {
        Ok(p) => p,
        Err(err) => {
            eprintln!("Error: {err}");
            return crate::exit_codes::exit_code_for_prompt_error(&err);
        }
    };

    let recovery_passphrase: Option<SecretString> = if args.no_recovery {
        None
    } else {
        read_line("Recovery passphrase (optional): ")
            .ok()
            .flatten()
            .map(SecretString::from)
    };

    let mut service = VaultService::new(ctx.vault_path.clone());
    let result = service.initialize(
        &password,
        InitOptions {
            enable_recovery: !args.no_recovery,
            recovery_passphrase,
            audit_enabled: !args.no_audit,
        },
    );

    let init_result = match result {
        Ok(result) => result,
        Err(err) => return vault_error(err),
    };

    if args.use_keychain {
        if let Err(err) = service.enable_keychain(&password, false) {
            return vault_error(err);
        }
    }

    let mnemonic = init_result.recovery_mnemonic.unwrap_or_default();
    emit(
        ctx,
        serde_json::json!({
            "vault_path": service.vault_path().display().to_string(),
            "recovery_mnemonic": mnemonic,
        }),
        || {
            let mut out = format!("Vault created at {}", service.vault_path().display());
            if !mnemonic.is_empty() {
                out.push_str("\n\nRecovery phrase (write this down, it will not be shown again):\n");
                out.push_str(&mnemonic.join(" "));
            }
            out
        },
    );
    ExitCode::SUCCESS
}
