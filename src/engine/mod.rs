//! Engine module: command line, progress display and file helpers

pub mod arg_parser;
pub mod cli;
pub mod progress;
pub mod tools;

pub use arg_parser::Cli;
pub use cli::handle_run;
pub use tools::{check_input_file, expand_observation_glob, glob_match, list_matching};
