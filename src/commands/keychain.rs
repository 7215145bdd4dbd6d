use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli::KeychainAction;
use crate::commands::support::{emit, prompt_password, vault_error};
use crate::output::credential;
use crate::vault::VaultService;

pub fn run(action: KeychainAction, ctx: &AppContext) -> ExitCode {
    match action {
        KeychainAction::Enable { force } => enable(ctx, force),
        KeychainAction::Status => status(ctx),
    }
}

fn enable(ctx: &AppContext, force: bool) -> ExitCode {
    let mut service = VaultService::new(ctx.vault_path.clone());
    let password = match prompt_password("unlocking the vault") {
        Ok(p) => p,
        Err(code) => return code,
    };
    if let Err(err) = service.unlock(&password) {
        return vault_error(err);
    }
    if let Err(err) = service.enable_keychain(&password, force) {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"keychain_enabled": true}),
        || "Keychain unlock enabled.".to_string(),
    );
    ExitCode::SUCCESS
}

fn status(ctx: &AppContext) -> ExitCode {
    let service = VaultService::new(ctx.vault_path.clone());
    let status = service.keychain_status();

    emit(
        ctx,
        credential::keychain_status_json(&status),
        || credential::keychain_status_text(&status),
    );
    ExitCode::SUCCESS
}
