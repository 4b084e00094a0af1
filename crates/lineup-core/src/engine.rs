use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::color::{self, Hsl};
use crate::event::{Event, EventId};
use crate::filter::{self, DayControl, FilterState, RenderDirective, VisibilityPass};
use crate::layout::{self, Layout};
use crate::prefs::PrefStore;

/// Everything that can change engine state. Each variant corresponds to a
/// discrete trigger (a user toggle, or the periodic expiry tick) and
/// runs to completion before the next is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleDay(NaiveDate),
    ToggleFavoritesFilter,
    ToggleFavorite(EventId),
    ExpiryTick,
}

/// One visible event as the renderer consumes it: the entity plus its
/// derived display identity.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleEvent {
    #[serde(flatten)]
    pub event: Event,
    pub row: usize,
    pub color: Hsl,
}

type VisibilityCallback = Box<dyn FnOnce(&VisibilityPass)>;

/// The engine context: owns the immutable dataset, the derived color
/// table, the filter state, the store handle, and the current snapshot.
/// No module-level state; multiple independent engines can coexist.
pub struct Engine {
    events: Vec<Event>,
    colors: BTreeMap<EventId, Hsl>,
    state: FilterState,
    store: PrefStore,
    pass: VisibilityPass,
    layout: Layout,
    visible: Vec<VisibleEvent>,
    callbacks: Vec<VisibilityCallback>,
}

impl Engine {
    /// Initial load: seed filter state from the store, assign colors over
    /// the full chronological set, and run the first visibility pass.
    #[instrument(skip(store, events, now), fields(events = events.len()))]
    pub fn load(store: PrefStore, events: Vec<Event>, now: DateTime<Utc>) -> Self {
        let colors = color::assign_colors(&events);
        let persisted_days = store.load_day_filters();
        let favorites = store.load_favorites();
        let state = FilterState::seed(&events, &persisted_days, favorites);

        info!(
            events = events.len(),
            days = state.day_active.len(),
            favorites = state.favorites.len(),
            "engine loaded"
        );

        let mut engine = Self {
            events,
            colors,
            state,
            store,
            pass: VisibilityPass::cleared(vec![], false),
            layout: Layout::default(),
            visible: Vec::new(),
            callbacks: Vec::new(),
        };
        engine.recompute(now);
        engine
    }

    /// Reduce one command against the filter state, persist what changed,
    /// and recompute the snapshot. Idempotent in the sense that replaying
    /// the resulting state through [`Self::recompute`] with the same `now`
    /// yields the same snapshot.
    #[instrument(skip(self, now))]
    pub fn apply(&mut self, command: Command, now: DateTime<Utc>) -> anyhow::Result<()> {
        match command {
            Command::ToggleDay(date) => {
                if !self.state.toggle_day(date) {
                    warn!(%date, "ignoring toggle for a day not in the dataset");
                    return Ok(());
                }
                self.store.save_day_filters(&self.state.day_active)?;
            }
            Command::ToggleFavoritesFilter => {
                // Transient: flipped in memory only; `compose` corrects it
                // if the favorites set is empty.
                self.state.favorites_only = !self.state.favorites_only;
            }
            Command::ToggleFavorite(id) => {
                self.state.toggle_favorite(&id);
                self.store.save_favorites(&self.state.favorites)?;
            }
            Command::ExpiryTick => {}
        }

        self.recompute(now);
        Ok(())
    }

    fn recompute(&mut self, now: DateTime<Utc>) {
        let pass = filter::compose(&self.events, &mut self.state, now);

        // The composer's Clear directive means "skip layout entirely".
        let layout = match pass.directive {
            RenderDirective::Clear => Layout::default(),
            RenderDirective::Draw => layout::pack(&pass.visible),
        };

        self.visible = pass
            .visible
            .iter()
            .map(|event| VisibleEvent {
                event: event.clone(),
                row: layout.row_of(&event.id).unwrap_or(0),
                color: self.colors.get(&event.id).copied().unwrap_or_default(),
            })
            .collect();
        self.layout = layout;
        self.pass = pass;

        debug!(
            visible = self.visible.len(),
            rows = self.layout.row_count,
            "visibility recomputed"
        );

        let callbacks = std::mem::take(&mut self.callbacks);
        for callback in callbacks {
            callback(&self.pass);
        }
    }

    pub fn visible_events(&self) -> &[VisibleEvent] {
        &self.visible
    }

    pub fn time_extent(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.layout.extent
    }

    pub fn row_count(&self) -> usize {
        self.layout.row_count
    }

    pub fn day_controls(&self) -> &[DayControl] {
        &self.pass.day_controls
    }

    pub fn favorites_control_shown(&self) -> bool {
        self.pass.favorites_shown
    }

    pub fn directive(&self) -> RenderDirective {
        self.pass.directive
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Look an event up by external id, falling back to an exact name
    /// match; the CLI accepts either.
    pub fn find_event(&self, needle: &str) -> Option<&Event> {
        self.events
            .iter()
            .find(|event| event.id.as_str() == needle)
            .or_else(|| self.events.iter().find(|event| event.name == needle))
    }

    /// Register a callback for the next recomputation. Callbacks are
    /// one-shot and drained each pass; consumers re-subscribe after every
    /// redraw.
    pub fn on_visibility_changed(&mut self, callback: impl FnOnce(&VisibilityPass) + 'static) {
        self.callbacks.push(Box::new(callback));
    }
}

/// Cooperative expiry timer. The owner sleeps for [`Ticker::interval`],
/// applies [`Command::ExpiryTick`], and checks for cancellation; a
/// cancelled ticker never fires again. Cancellation on session teardown
/// keeps a late tick from touching a renderer that no longer exists.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    cancelled: bool,
}

impl Ticker {
    pub fn new(minutes: u64) -> Self {
        Self {
            interval: Duration::from_secs(minutes * 60),
            cancelled: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel(&mut self) {
        debug!("expiry ticker cancelled");
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{Command, Engine, Ticker};
    use crate::event::{Event, EventId};
    use crate::filter::RenderDirective;
    use crate::prefs::PrefStore;

    fn event(name: &str, day: u32, start_hour: u32, end_hour: u32) -> Event {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date");
        Event {
            id: EventId::derived(name, date),
            name: name.to_string(),
            date,
            start: Utc
                .with_ymd_and_hms(2024, 3, day, start_hour, 0, 0)
                .single()
                .expect("valid start"),
            end: Utc
                .with_ymd_and_hms(2024, 3, day, end_hour, 0, 0)
                .single()
                .expect("valid end"),
            location: None,
            coordinates: None,
            tags: vec![],
            rsvp_url: None,
            image: "default.png".to_string(),
            description: String::new(),
        }
    }

    fn dawn(day: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 6, 0, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn load_computes_rows_colors_and_extent() {
        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![
            event("a", 8, 10, 11),
            event("b", 8, 10, 12),
            event("c", 9, 10, 11),
        ];

        let engine = Engine::load(store, events.clone(), dawn(8));
        assert_eq!(engine.visible_events().len(), 3);
        assert_eq!(engine.row_count(), 2);
        assert_eq!(engine.directive(), RenderDirective::Draw);

        let extent = engine.time_extent().expect("extent");
        assert_eq!(extent.0, events[0].start);
        assert_eq!(extent.1, events[2].end);

        // Colors come from the full chronological set.
        let hues: Vec<f32> = engine
            .visible_events()
            .iter()
            .map(|visible| visible.color.hue)
            .collect();
        assert_eq!(hues, vec![0.0, 120.0, 240.0]);
    }

    #[test]
    fn toggling_a_day_restricts_and_persists() {
        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![event("a", 8, 10, 11), event("b", 9, 10, 11)];
        let friday = events[0].date;

        let mut engine = Engine::load(store, events.clone(), dawn(8));
        engine
            .apply(Command::ToggleDay(friday), dawn(8))
            .expect("toggle day");
        assert_eq!(engine.visible_events().len(), 1);
        assert_eq!(engine.visible_events()[0].event.name, "b");

        // The persisted flag survives a reopen of the same data dir.
        let reopened = PrefStore::open(temp.path()).expect("reopen store");
        assert_eq!(reopened.load_day_filters().get(&friday), Some(&false));
    }

    #[test]
    fn toggling_an_unknown_day_is_a_warned_noop() {
        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![event("a", 8, 10, 11)];

        let mut engine = Engine::load(store, events, dawn(8));
        let unknown = NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date");
        engine
            .apply(Command::ToggleDay(unknown), dawn(8))
            .expect("apply");
        assert_eq!(engine.visible_events().len(), 1);
    }

    #[test]
    fn favorites_filter_flow_with_auto_reset() {
        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![event("a", 8, 10, 11), event("b", 8, 12, 13)];
        let a_id = events[0].id.clone();

        let mut engine = Engine::load(store, events, dawn(8));
        assert!(!engine.favorites_control_shown());

        engine
            .apply(Command::ToggleFavorite(a_id.clone()), dawn(8))
            .expect("favorite a");
        assert!(engine.favorites_control_shown());

        engine
            .apply(Command::ToggleFavoritesFilter, dawn(8))
            .expect("enable filter");
        assert_eq!(engine.visible_events().len(), 1);
        assert_eq!(engine.visible_events()[0].event.name, "a");

        // Unmarking the only favorite drains the set: the control hides
        // and the filter resets in the same pass.
        engine
            .apply(Command::ToggleFavorite(a_id), dawn(8))
            .expect("unfavorite a");
        assert!(!engine.favorites_control_shown());
        assert!(!engine.state().favorites_only);
        assert_eq!(engine.visible_events().len(), 2);
    }

    #[test]
    fn expiry_tick_drops_ended_events_without_user_input() {
        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![event("morning", 8, 9, 10), event("evening", 8, 18, 20)];

        let mut engine = Engine::load(store, events, dawn(8));
        assert_eq!(engine.visible_events().len(), 2);

        let noon = Utc
            .with_ymd_and_hms(2024, 3, 8, 12, 0, 0)
            .single()
            .expect("valid instant");
        engine.apply(Command::ExpiryTick, noon).expect("tick");
        assert_eq!(engine.visible_events().len(), 1);
        assert_eq!(engine.visible_events()[0].event.name, "evening");
    }

    #[test]
    fn all_days_off_clears_without_layout() {
        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![event("a", 8, 10, 11), event("b", 9, 10, 11)];
        let days: Vec<NaiveDate> = vec![events[0].date, events[1].date];

        let mut engine = Engine::load(store, events, dawn(8));
        for day in days {
            engine
                .apply(Command::ToggleDay(day), dawn(8))
                .expect("toggle");
        }

        assert_eq!(engine.directive(), RenderDirective::Clear);
        assert!(engine.visible_events().is_empty());
        assert!(engine.time_extent().is_none());
        assert_eq!(engine.row_count(), 0);
    }

    #[test]
    fn visibility_callbacks_are_one_shot() {
        use std::cell::Cell;
        use std::rc::Rc;

        let temp = tempdir().expect("tempdir");
        let store = PrefStore::open(temp.path()).expect("open store");
        let events = vec![event("a", 8, 10, 11)];

        let mut engine = Engine::load(store, events, dawn(8));
        let fired = Rc::new(Cell::new(0));
        let seen = Rc::clone(&fired);
        engine.on_visibility_changed(move |_pass| seen.set(seen.get() + 1));

        engine.apply(Command::ExpiryTick, dawn(8)).expect("tick");
        engine.apply(Command::ExpiryTick, dawn(8)).expect("tick");
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn ticker_cancellation_is_sticky() {
        let mut ticker = Ticker::new(5);
        assert_eq!(ticker.interval().as_secs(), 300);
        assert!(!ticker.is_cancelled());
        ticker.cancel();
        assert!(ticker.is_cancelled());
    }
}
