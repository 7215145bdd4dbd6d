//! Shared plumbing every command needs: opening a [`VaultService`] and
//! turning a prompt/vault error into the process's exit code.

use std::process::ExitCode;

use secrecy::SecretString;

use crate::vault::{self, VaultService};
use crate::{exit_codes, output};

pub fn prompt_password(label_context: &str) -> Result<SecretString, ExitCode> {
    vault::prompt_master_password().map_err(|err| {
        eprintln!("Error: {err} ({label_context})");
        exit_codes::exit_code_for_prompt_error(&err)
    })
}

pub fn vault_error(err: vault::VaultError) -> ExitCode {
    eprintln!("Error: {err}");
    exit_codes::exit_code_for_vault_error(&err)
}

/// Open the vault at `ctx.vault_path` and unlock it, prompting for the
/// master password on stdin.
pub fn open_and_unlock(ctx: &crate::app::AppContext) -> Result<VaultService, ExitCode> {
    let mut service = VaultService::new(ctx.vault_path.clone());
    let password = prompt_password("unlocking the vault")?;
    service.unlock(&password).map_err(vault_error)?;
    Ok(service)
}

pub fn emit(ctx: &crate::app::AppContext, json_value: serde_json::Value, text: impl FnOnce() -> String) {
    output::emit(&ctx.output_mode, json_value, text);
}

/// If `service` has been fetched from more than one location and `force` is
/// not set, ask for interactive confirmation before a destructive
/// update/delete (§6 `--force`). Returns `Ok(false)` on a declined prompt,
/// `Ok(true)` when the caller may proceed.
pub fn confirm_if_recently_accessed(
    service: &mut VaultService,
    name: &str,
    force: bool,
) -> Result<bool, ExitCode> {
    if force {
        return Ok(true);
    }
    let view = match service.get_credential(name, None, None) {
        Ok(view) => view,
        Err(err) => return Err(vault_error(err)),
    };
    if view.usage_location_count == 0 {
        return Ok(true);
    }
    match read_line(&format!(
        "{name} has been used from {} location(s). Continue? (y/N): ",
        view.usage_location_count
    )) {
        Ok(Some(answer)) => Ok(answer.eq_ignore_ascii_case("y")),
        Ok(None) => Ok(false),
        Err(err) => {
            eprintln!("Error: {err}");
            Err(ExitCode::from(exit_codes::EXIT_ENVIRONMENT))
        }
    }
}

/// Read one line of plain (echoed) input for a non-secret field such as
/// username, URL, category, or notes. An empty line means "leave unset".
pub fn read_line(prompt: &str) -> std::io::Result<Option<String>> {
    use std::io::Write;
    eprint!("{prompt}");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\n', '\r']).trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}
