use std::process::ExitCode;

fn main() -> ExitCode {
    strand_cli::run()
}
