//! CLI command handler: load the configuration, wire the real marker store and process
//! runner, then run the search.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::arg_parser::Cli;
use crate::pipeline::{ExecContext, run_search};
use crate::task::{FsMarkerStore, ShellRunner, tool_env};
use crate::utils::config::WorkDirs;
use crate::utils::search_toml::SearchConfig;
use crate::utils::setup_logging;

/// Explicit config must exist; the default one is optional.
fn load_config(cli: &Cli) -> Result<SearchConfig> {
    let path = cli.config_path();
    let mut config = if cli.config.is_some() || path.is_file() {
        SearchConfig::load(&path)?
    } else {
        info!("No {} found; using defaults", path.display());
        SearchConfig::default()
    };
    config.apply_overrides(&cli.overrides());
    config.validate()?;
    Ok(config)
}

/// Run the search (or only its planning when --dry-run).
pub fn handle_run(cli: &Cli) -> Result<()> {
    let verbose = cli.verbose.unwrap_or(false);
    setup_logging(verbose);
    // PRESTO and friends may come from a .env next to the config.
    let _ = dotenvy::dotenv();

    let config = load_config(cli)?;
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        config
    );

    let cancel_requested = Arc::new(AtomicBool::new(false));
    let cancel_requested_handler = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        cancel_requested_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    let presto = config.presto_root();
    if presto.is_none() {
        warn!("PRESTO is not set; the external tools must be on PATH");
    }
    let markers = FsMarkerStore::new(config.resources.root_workdir.join(WorkDirs::MARKERS));
    let ctx = ExecContext::new(Arc::new(markers), Arc::new(ShellRunner))
        .with_env(tool_env(presto.as_deref()))
        .with_cancel(cancel_requested)
        .with_progress(cli.progress.unwrap_or(true))
        .with_verbose(verbose);

    if cli.dry_run {
        warn!("RUNNING IN DRY-RUN MODE. NO SEARCH STAGE WILL BE STARTED.");
    }
    let summary = run_search(&config, &cli.observation, &ctx, cli.dry_run)?;
    match summary.failed_tasks() {
        0 => info!("Done"),
        n => warn!("{n} task(s) failed; rerun the same command to retry them"),
    }
    Ok(())
}
