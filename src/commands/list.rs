use std::process::ExitCode;

use crate::app::AppContext;
use crate::commands::support::{emit, open_and_unlock, vault_error};
use crate::output::credential;

pub fn run(ctx: &AppContext) -> ExitCode {
    let service = match open_and_unlock(ctx) {
        Ok(service) => service,
        Err(code) => return code,
    };

    let services = match service.list_credentials() {
        Ok(services) => services,
        Err(err) => return vault_error(err),
    };

    emit(
        ctx,
        credential::list_json(&services),
        || credential::list_text(&services),
    );
    ExitCode::SUCCESS
}
