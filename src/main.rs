use std::process::ExitCode;

fn main() -> ExitCode {
    pass_cli::app::run()
}
