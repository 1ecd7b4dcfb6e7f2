pub mod cli;
pub mod column;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod drag;
pub mod engine;
pub mod gateway;
pub mod lead;
pub mod localstore;
pub mod order;
pub mod profile;
pub mod rank;
pub mod render;
pub mod store;
pub mod suggest;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting funnel CLI");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let mut store = localstore::LocalStore::open(&data_dir)
        .with_context(|| format!("failed to open local store at {}", data_dir.display()))?;

    let mut renderer = render::Renderer::new(&cfg)?;

    let command = cli.command.unwrap_or_else(|| {
        let name = cfg
            .get("default.command")
            .unwrap_or_else(|| "board".to_string());
        debug!(command = %name, "no explicit command, using default");
        cli::default_command(&name)
    });

    commands::dispatch(&mut store, &cfg, &mut renderer, command)?;

    info!("done");
    Ok(())
}
