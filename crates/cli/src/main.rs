use std::process::ExitCode;

fn main() -> ExitCode {
    kendra_cli::run()
}
