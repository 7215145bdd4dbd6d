use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli::UpdateArgs;
use crate::commands::support::{confirm_if_recently_accessed, emit, open_and_unlock, prompt_password, read_line, vault_error};
use crate::vault::CredentialUpdate;

pub fn run(args: UpdateArgs, ctx: &AppContext) -> ExitCode {
    let mut service = match open_and_unlock(ctx) {
        Ok(service) => service,
        Err(code) => return code,
    };

    match confirm_if_recently_accessed(&mut service, &args.service, args.force) {
        Ok(true) => {}
        Ok(false) => {
            println!("Cancelled.");
            return ExitCode::from(crate::exit_codes::EXIT_USER);
        }
        Err(code) => return code,
    }

    let username = read_line("New username (leave blank to keep): ").ok().flatten();
    let password = match read_line("Change password? (y/N): ") {
        Ok(Some(answer)) if answer.eq_ignore_ascii_case("y") => match prompt_password("new credential password") {
            Ok(p) => Some(p),
            Err(code) => return code,
        },
        _ => None,
    };
    let url = read_line("New URL (leave blank to keep): ").ok().flatten();
    let category = read_line("New category (leave blank to keep): ").ok().flatten();
    let notes = read_line("New notes (leave blank to keep): ").ok().flatten();

    let update = CredentialUpdate {
        username,
        password,
        url: url.map(Some),
        category: category.map(Some),
        notes: notes.map(Some),
    };

    if let Err(err) = service.update_credential(&args.service, update) {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"service": args.service, "updated": true}),
        || format!("Updated {}", args.service),
    );
    ExitCode::SUCCESS
}
