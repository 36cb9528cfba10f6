pub mod app;

use app::cli::{parse_args, run_cli, USAGE};

/// Entry point for the `apk_installer` binary; returns the process exit code.
pub fn run() -> i32 {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return 2;
        }
    };
    run_cli(args)
}
