use std::process::ExitCode;

use clap::Parser;
use paintover::cli::{self, CliArgs};
use paintover::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    logger::init(args.verbose);
    cli::run(args)
}
