use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli::GetArgs;
use crate::commands::support::{emit, open_and_unlock, vault_error};
use crate::output::credential;

pub fn run(args: GetArgs, ctx: &AppContext) -> ExitCode {
    let mut service = match open_and_unlock(ctx) {
        Ok(service) => service,
        Err(code) => return code,
    };

    let location = std::env::current_dir()
        .ok()
        .map(|p| p.display().to_string());

    let view = match service.get_credential(&args.service, location.as_deref(), args.field.as_deref()) {
        Ok(view) => view,
        Err(err) => return vault_error(err),
    };

    emit(
        ctx,
        credential::credential_json(&view, args.field.as_deref()),
        || credential::credential_text(&view, args.field.as_deref()),
    );
    ExitCode::SUCCESS
}
