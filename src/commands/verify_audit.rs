use std::process::ExitCode;

use crate::app::AppContext;
use crate::commands::support::{emit, vault_error};
use crate::output::credential;
use crate::vault::VaultService;

pub fn run(ctx: &AppContext) -> ExitCode {
    let service = VaultService::new(ctx.vault_path.clone());
    let (report, mismatches) = match service.verify_audit() {
        Ok(result) => result,
        Err(err) => return vault_error(err),
    };

    emit(
        ctx,
        credential::audit_report_json(&report, &mismatches),
        || credential::audit_report_text(&report, &mismatches),
    );

    if report.invalid > 0 {
        ExitCode::from(crate::exit_codes::EXIT_USER)
    } else {
        ExitCode::SUCCESS
    }
}
