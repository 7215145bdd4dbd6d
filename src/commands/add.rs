use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli::AddArgs;
use crate::commands::support::{emit, open_and_unlock, prompt_password, read_line, vault_error};

pub fn run(args: AddArgs, ctx: &AppContext) -> ExitCode {
    let mut service = match open_and_unlock(ctx) {
        Ok(service) => service,
        Err(code) => return code,
    };

    let username = match read_line("Username: ") {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(crate::exit_codes::EXIT_ENVIRONMENT);
        }
    };
    let password = match prompt_password("credential password") {
        Ok(p) => p,
        Err(code) => return code,
    };
    let url = read_line("URL (optional): ").ok().flatten();
    let category = read_line("Category (optional): ").ok().flatten();
    let notes = read_line("Notes (optional): ").ok().flatten();

    if let Err(err) = service.add_credential(&args.service, &username, password, url, category, notes) {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"service": args.service, "added": true}),
        || format!("Added {}", args.service),
    );
    ExitCode::SUCCESS
}
