use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli::{BackupAction, VaultAction};
use crate::commands::support::{emit, prompt_password, read_line, vault_error};
use crate::output::credential;
use crate::vault::VaultService;

pub fn run(action: VaultAction, ctx: &AppContext) -> ExitCode {
    match action {
        VaultAction::Migrate => migrate(ctx),
        VaultAction::Remove { yes } => remove(ctx, yes),
        VaultAction::Backup { action } => backup(ctx, action),
    }
}

fn migrate(ctx: &AppContext) -> ExitCode {
    let mut service = VaultService::new(ctx.vault_path.clone());
    let password = match prompt_password("migrating the vault") {
        Ok(p) => p,
        Err(code) => return code,
    };
    if let Err(err) = service.migrate_to_v2(&password) {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"migrated": true}),
        || "Vault migrated to the v2 envelope format.".to_string(),
    );
    ExitCode::SUCCESS
}

fn remove(ctx: &AppContext, yes: bool) -> ExitCode {
    if !yes {
        match read_line("This permanently deletes the vault, its backups, and its audit log. Continue? (y/N): ") {
            Ok(Some(answer)) if answer.eq_ignore_ascii_case("y") => {}
            _ => {
                println!("Cancelled.");
                return ExitCode::from(crate::exit_codes::EXIT_USER);
            }
        }
    }

    let mut service = VaultService::new(ctx.vault_path.clone());
    if let Err(err) = service.remove() {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"removed": true}),
        || "Vault removed.".to_string(),
    );
    ExitCode::SUCCESS
}

fn backup(ctx: &AppContext, action: BackupAction) -> ExitCode {
    let mut service = VaultService::new(ctx.vault_path.clone());
    match action {
        BackupAction::Create => match service.backup_create() {
            Ok(path) => {
                emit(
                    ctx,
                    serde_json::json!({"backup_path": path.display().to_string()}),
                    || format!("Created backup at {}", path.display()),
                );
                ExitCode::SUCCESS
            }
            Err(err) => vault_error(err),
        },
        BackupAction::Restore => match service.backup_restore() {
            Ok(path) => {
                emit(
                    ctx,
                    serde_json::json!({"restored_from": path.display().to_string()}),
                    || format!("Restored vault from {}", path.display()),
                );
                ExitCode::SUCCESS
            }
            Err(err) => vault_error(err),
        },
        BackupAction::Info => {
            let backups = service.backup_info();
            emit(
                ctx,
                credential::backup_info_json(&backups),
                || credential::backup_info_text(&backups),
            );
            ExitCode::SUCCESS
        }
    }
}
