use clap::Parser;
use history_brush::{cli, logger};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    if args.log {
        logger::init();
    }
    cli::run(args)
}
