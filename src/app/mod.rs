use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{error::ErrorKind as ClapErrorKind, ColorChoice, CommandFactory, FromArgMatches};

use crate::{cli, commands, exit_codes, output, vault};

pub struct AppContext {
    pub output_mode: output::OutputMode,
    pub vault_path: PathBuf,
}

pub fn run() -> ExitCode {
    init_tracing();

    let cli = match parse_cli() {
        Ok(cli) => cli,
        Err(code) => return code,
    };

    let resolved = match crate::config::resolve(cli.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("Error: {err}");
            return exit_codes::exit_code_for_config_error(&err);
        }
    };

    let vault_path = match resolved
        .vault_path
        .map(Ok)
        .unwrap_or_else(|| vault::default_vault_path(None))
    {
        Ok(path) => path,
        Err(err) => {
            eprintln!("Error: {err}");
            return exit_codes::exit_code_for_vault_error(&err);
        }
    };

    let Some(command) = cli.command else {
        let mut cmd = configure_command_colors(cli::Cli::command());
        cmd.print_help().expect("help to be printed");
        println!();
        return ExitCode::from(exit_codes::EXIT_USER);
    };

    let ctx = AppContext {
        output_mode: output::OutputMode { json: cli.json },
        vault_path,
    };

    commands::dispatch(command, &ctx)
}

/// Install a `tracing-subscriber` writer to stderr, honoring `RUST_LOG`
/// (`SPEC_FULL.md` §10.2) — the teacher has no logging at all, so there is
/// no prior behavior to preserve beyond "stderr, never stdout".
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_cli() -> Result<cli::Cli, ExitCode> {
    let cmd = configure_command_colors(cli::Cli::command());

    let matches = match cmd.try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let kind = err.kind();
            if matches!(
                kind,
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion
            ) {
                let _ = err.print();
                return Err(ExitCode::SUCCESS);
            }

            let _ = err.print();
            return Err(ExitCode::from(exit_codes::EXIT_USER));
        }
    };

    match cli::Cli::from_arg_matches(&matches) {
        Ok(cli) => Ok(cli),
        Err(err) => {
            let _ = err.print();
            Err(ExitCode::from(exit_codes::EXIT_USER))
        }
    }
}

fn configure_command_colors(mut cmd: clap::Command) -> clap::Command {
    let no_color = std::env::var_os("NO_COLOR").is_some();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let stderr_is_tty = std::io::stderr().is_terminal();

    if no_color || !(stdout_is_tty && stderr_is_tty) {
        cmd = cmd.color(ColorChoice::Never);
    }

    cmd
}
