use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::cli::Action;
use crate::config::Config;
use crate::datetime;
use crate::engine::{Command, Engine, Ticker};
use crate::filter::RenderDirective;
use crate::render::Renderer;

#[instrument(skip(engine, cfg, renderer, action))]
pub fn dispatch(
    engine: &mut Engine,
    cfg: &Config,
    renderer: &mut Renderer,
    action: Action,
) -> anyhow::Result<()> {
    debug!(?action, "dispatching action");

    match action {
        Action::Show => cmd_show(engine, renderer),
        Action::Days => cmd_days(engine, renderer),
        Action::ToggleDay { date } => cmd_toggle_day(engine, renderer, &date),
        Action::Fav { event } => cmd_fav(engine, renderer, &event),
        Action::Favorites => cmd_favorites(engine, renderer),
        Action::Extent => cmd_extent(engine, renderer),
        Action::Export => cmd_export(engine),
        Action::Watch { ticks } => cmd_watch(engine, cfg, renderer, ticks),
    }
}

fn redraw(engine: &Engine, renderer: &mut Renderer) -> anyhow::Result<()> {
    match engine.directive() {
        RenderDirective::Clear => renderer.print_cleared(),
        RenderDirective::Draw => renderer.print_schedule(engine.visible_events()),
    }
}

#[instrument(skip(engine, renderer))]
fn cmd_show(engine: &mut Engine, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command show");
    redraw(engine, renderer)
}

#[instrument(skip(engine, renderer))]
fn cmd_days(engine: &mut Engine, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command days");
    renderer.print_day_controls(engine.day_controls(), engine.favorites_control_shown())
}

#[instrument(skip(engine, renderer))]
fn cmd_toggle_day(engine: &mut Engine, renderer: &mut Renderer, raw: &str) -> anyhow::Result<()> {
    info!(date = raw, "command toggle-day");

    let date =
        datetime::parse_day(raw).ok_or_else(|| anyhow!("expected YYYY-MM-DD, got: {raw}"))?;
    engine.apply(Command::ToggleDay(date), Utc::now())?;
    redraw(engine, renderer)
}

#[instrument(skip(engine, renderer))]
fn cmd_fav(engine: &mut Engine, renderer: &mut Renderer, needle: &str) -> anyhow::Result<()> {
    info!(event = needle, "command fav");

    let Some(event) = engine.find_event(needle) else {
        // Favoriting something not in the dataset is allowed to fail
        // loudly; unlike day toggles there is no stale-control story.
        return Err(anyhow!("no event with id or name: {needle}"));
    };
    let id = event.id.clone();
    engine.apply(Command::ToggleFavorite(id.clone()), Utc::now())?;

    let marked = engine.state().is_favorite(&id);
    println!(
        "{} {}.",
        if marked { "Favorited" } else { "Unfavorited" },
        needle
    );
    redraw(engine, renderer)
}

#[instrument(skip(engine, renderer))]
fn cmd_favorites(engine: &mut Engine, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command favorites");

    engine.apply(Command::ToggleFavoritesFilter, Utc::now())?;
    println!(
        "Favorites filter {}.",
        if engine.state().favorites_only {
            "on"
        } else {
            "off"
        }
    );
    redraw(engine, renderer)
}

#[instrument(skip(engine, renderer))]
fn cmd_extent(engine: &mut Engine, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command extent");
    renderer.print_extent(engine.time_extent())
}

#[instrument(skip(engine))]
fn cmd_export(engine: &mut Engine) -> anyhow::Result<()> {
    info!("command export");

    let out = serde_json::to_string(engine.visible_events())?;
    println!("{out}");
    Ok(())
}

/// The periodic expiry loop: sleep, tick, redraw. The ticker is cancelled
/// once the tick limit is reached (or the process is interrupted), after
/// which no further tick can touch the renderer.
#[instrument(skip(engine, cfg, renderer))]
fn cmd_watch(
    engine: &mut Engine,
    cfg: &Config,
    renderer: &mut Renderer,
    ticks: Option<u32>,
) -> anyhow::Result<()> {
    let minutes = cfg.refresh_minutes();
    info!(minutes, ?ticks, "command watch");

    redraw(engine, renderer)?;

    let mut ticker = Ticker::new(minutes);
    let mut fired = 0_u32;

    while !ticker.is_cancelled() {
        std::thread::sleep(ticker.interval());
        engine.apply(Command::ExpiryTick, Utc::now())?;
        redraw(engine, renderer)?;

        fired += 1;
        if let Some(limit) = ticks
            && fired >= limit
        {
            ticker.cancel();
        }
    }

    info!(fired, "watch loop ended");
    Ok(())
}
