use std::process::ExitCode;

use clap::Parser;
use cutoutfe::cli::{self, CliArgs};
use cutoutfe::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init(args.verbose);
    if let Some(path) = logger::log_path() {
        log::debug!("logging to {}", path.display());
    }
    cli::run(args)
}
