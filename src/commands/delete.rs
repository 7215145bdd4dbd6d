use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli::DeleteArgs;
use crate::commands::support::{confirm_if_recently_accessed, emit, open_and_unlock, vault_error};

pub fn run(args: DeleteArgs, ctx: &AppContext) -> ExitCode {
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

    if let Err(err) = service.delete_credential(&args.service) {
        return vault_error(err);
    }

    emit(
        ctx,
        serde_json::json!({"service": args.service, "deleted": true}),
        || format!("Deleted {}", args.service),
    );
    ExitCode::SUCCESS
}
