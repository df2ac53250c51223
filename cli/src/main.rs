//! pinfetch CLI entrypoint.
//!
//! Parses arguments, installs logging and runs the selected phase against
//! the HTTP transport. Exits with status 1 when the run fails.

use clap::Parser;
use pinfetch::fetch::HttpFetcher;
use pinfetch_cli::cli::Cli;
use pinfetch_cli::logging::init_logging;
use pinfetch_cli::run::{exit_code_for_run_result, run};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &HttpFetcher, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
