pub mod cli;
pub mod color;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod engine;
pub mod event;
pub mod filter;
pub mod ingest;
pub mod layout;
pub mod prefs;
pub mod render;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::info;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting lineup");

    let mut cfg = config::Config::load(cli.lineuprc.as_deref())?;
    cfg.apply_overrides(
        cli.rc_overrides
            .into_iter()
            .map(|kv| (kv.key, kv.value)),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = prefs::PrefStore::open(&data_dir).with_context(|| {
        format!("failed to open preference store at {}", data_dir.display())
    })?;

    let schedule_path = config::resolve_schedule_path(&cfg, cli.schedule.as_deref())
        .context("failed to resolve schedule location")?;
    let events = ingest::load_schedule(&schedule_path)?;

    let mut engine = engine::Engine::load(store, events, Utc::now());
    let mut renderer = render::Renderer::new(&cfg)?;

    commands::dispatch(
        &mut engine,
        &cfg,
        &mut renderer,
        cli.action.unwrap_or(cli::Action::Show),
    )?;

    info!("done");
    Ok(())
}
