use clap::Parser;
use std::path::PathBuf;

use crate::utils::config::PackagePaths;
use crate::utils::search_toml::ConfigOverrides;

/// Control plane of a periodicity search over radio observations.
#[derive(Clone, Parser)]
#[command(name = "psrsieve")]
#[command(
    about = "Plan, run and resume a pulsar periodicity search; use --dry-run to plan and check disk space only."
)]
pub struct Cli {
    /// Observation file, or a glob in quotes (e.g. "data/*.fil").
    #[arg(value_name = "OBSERVATION")]
    pub observation: String,

    /// Configuration file. Default: `psrsieve.toml` in the current directory.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Root work directory; overrides `[resources] root_workdir`.
    #[arg(long, short = 'w')]
    pub workdir: Option<PathBuf>,

    /// Number of Tasks run at once; overrides `[resources] pool_size`.
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Read headers, plan and check the disk budget; run no search stage.
    #[arg(long)]
    pub dry_run: bool,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Show a progress bar per stage. Default: on.
    #[arg(long, short = 'p', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub progress: Option<bool>,

    /// Fold the sifted candidates; overrides `[steps] folding`.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub fold: Option<bool>,

    /// Run the single-pulse search; overrides `[steps] singlepulse`.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub singlepulse: Option<bool>,
}

impl Cli {
    /// Config path, defaulting to the package config file in the current directory.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(PackagePaths::get().config_filename()))
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root_workdir: self.workdir.clone(),
            pool_size: self.jobs,
            fold: self.fold,
            singlepulse: self.singlepulse,
        }
    }
}
