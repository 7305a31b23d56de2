use std::process::ExitCode;

use clap::Parser;

use rasterlab::cli::{self, CliArgs};
use rasterlab::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = if args.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    logger::init(level, args.verbose);

    cli::run(args)
}
