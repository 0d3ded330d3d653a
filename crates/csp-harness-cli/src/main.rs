//! csp-check entry point: parse flags, set up logging, run, pick an exit code.

use clap::Parser;
use csp_harness_cli::{EXIT_FAIL, EXIT_FATAL, EXIT_PASS, check, cli, error, logger, report};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Cli::parse();

    let color = !args.no_color && logger::should_use_colors();
    logger::init_logger(args.verbose, args.quiet, !color);

    let suite = match check::execute(&args).await {
        Ok(suite) => suite,
        Err(err) => {
            eprintln!("{:?}", error::cli_error_to_miette(err));
            return ExitCode::from(EXIT_FATAL);
        }
    };

    if args.json {
        match report::to_json(&suite) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("{:?}", error::cli_error_to_miette(err.into()));
                return ExitCode::from(EXIT_FATAL);
            }
        }
    } else if !args.quiet || !suite.is_success() {
        println!("{}", report::render(&suite, color));
    }

    if suite.is_success() {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_FAIL)
    }
}
