//! psrsieve CLI: run or resume a search; use --dry-run to plan only.

use clap::Parser;
use psrsieve::FatalError;
use psrsieve::engine::arg_parser::Cli;
use psrsieve::engine::handle_run;
use psrsieve::utils::report_fatal;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let start_time = Instant::now();
    let cli = Cli::parse();
    match handle_run(&cli) {
        Ok(()) => {
            log::debug!("Total time: {:?}", start_time.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<FatalError>() {
                Some(fatal) => report_fatal(fatal),
                None => log::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
