mod add;
mod change_password;
mod delete;
mod get;
mod init;
mod keychain;
mod list;
pub(crate) mod support;
mod update;
mod vault;
mod verify_audit;

use std::process::ExitCode;

use crate::app::AppContext;
use crate::cli;

pub fn dispatch(command: cli::Commands, ctx: &AppContext) -> ExitCode {
    match command {
        cli::Commands::Init(args) => init::run(args, ctx),
        cli::Commands::Add(args) => add::run(args, ctx),
        cli::Commands::Get(args) => get::run(args, ctx),
        cli::Commands::List => list::run(ctx),
        cli::Commands::Update(args) => update::run(args, ctx),
        cli::Commands::Delete(args) => delete::run(args, ctx),
        cli::Commands::ChangePassword(args) => change_password::run(args, ctx),
        cli::Commands::Vault { action } => vault::run(action, ctx),
        cli::Commands::Keychain { action } => keychain::run(action, ctx),
        cli::Commands::VerifyAudit => verify_audit::run(ctx),
    }
}
