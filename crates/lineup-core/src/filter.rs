use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument, trace};

use crate::event::{Event, EventId};

/// User-controlled visibility state. `day_active` and `favorites` are
/// persisted; `favorites_only` is transient and auto-resets whenever the
/// favorites set drains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    pub day_active: BTreeMap<NaiveDate, bool>,
    pub favorites: BTreeMap<EventId, bool>,
    pub favorites_only: bool,
}

impl FilterState {
    /// Build the state for a freshly loaded dataset: one `day_active`
    /// entry per distinct date, defaulting to `true` unless the store had
    /// a prior value. Stale persisted days (no longer in the dataset) are
    /// dropped; stale favorites are kept, harmless and ignored.
    pub fn seed(
        events: &[Event],
        persisted_days: &BTreeMap<NaiveDate, bool>,
        favorites: BTreeMap<EventId, bool>,
    ) -> Self {
        let mut day_active = BTreeMap::new();
        for event in events {
            let active = persisted_days.get(&event.date).copied().unwrap_or(true);
            day_active.entry(event.date).or_insert(active);
        }

        Self {
            day_active,
            favorites,
            favorites_only: false,
        }
    }

    pub fn any_favorites(&self) -> bool {
        self.favorites.values().any(|&marked| marked)
    }

    pub fn is_favorite(&self, id: &EventId) -> bool {
        self.favorites.get(id).copied().unwrap_or(false)
    }

    /// Flip one day. Returns false for a date the dataset doesn't have,
    /// i.e. stale input from a control that no longer exists.
    pub fn toggle_day(&mut self, date: NaiveDate) -> bool {
        match self.day_active.get_mut(&date) {
            Some(active) => {
                *active = !*active;
                true
            }
            None => false,
        }
    }

    pub fn toggle_favorite(&mut self, id: &EventId) {
        let marked = !self.is_favorite(id);
        self.favorites.insert(id.clone(), marked);
    }
}

/// One day-filter control as the renderer should present it. A day whose
/// events have all ended is hidden outright, not merely switched off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayControl {
    pub date: NaiveDate,
    pub shown: bool,
    pub active: bool,
}

/// What the consumer should do with the result of a pass. `Clear` is the
/// all-days-off short circuit: tear down markers and timeline rather than
/// attempting an empty layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDirective {
    Draw,
    Clear,
}

/// Result of one visibility recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityPass {
    /// Visible events in input order. Cloned out of the dataset so the
    /// pass is a self-contained snapshot.
    pub visible: Vec<Event>,
    pub day_controls: Vec<DayControl>,
    pub favorites_shown: bool,
    pub directive: RenderDirective,
}

impl VisibilityPass {
    pub fn cleared(day_controls: Vec<DayControl>, favorites_shown: bool) -> Self {
        Self {
            visible: Vec::new(),
            day_controls,
            favorites_shown,
            directive: RenderDirective::Clear,
        }
    }
}

/// The per-event predicate, evaluated against `now`. Pure: no state is
/// touched, so re-evaluating with unchanged inputs gives the same answer.
pub fn is_visible(event: &Event, state: &FilterState, now: DateTime<Utc>) -> bool {
    let ok = state.day_active.get(&event.date).copied().unwrap_or(false)
        && !event.has_ended(now)
        && (!state.favorites_only || state.is_favorite(&event.id));
    trace!(id = %event.id, ok, "visibility predicate");
    ok
}

/// Recompute visibility and the derived control state in one pass.
///
/// Side effects on `state`, in order:
/// 1. a day with no unexpired events is hidden and forced inactive;
/// 2. an empty favorites set hides the favorites control and, if the
///    filter was on, resets it; the evaluation below then runs against
///    the corrected state, which is the single corrective pass;
/// 3. if every day ends up inactive, short-circuit to a `Clear` directive
///    without evaluating any per-event favorites/expiry logic.
#[instrument(skip(events, state, now))]
pub fn compose(events: &[Event], state: &mut FilterState, now: DateTime<Utc>) -> VisibilityPass {
    let mut day_controls = Vec::with_capacity(state.day_active.len());
    for (&date, active) in &mut state.day_active {
        let shown = events
            .iter()
            .any(|event| event.date == date && !event.has_ended(now));
        if !shown && *active {
            debug!(%date, "day fully expired; hiding its control");
            *active = false;
        }
        day_controls.push(DayControl {
            date,
            shown,
            active: *active,
        });
    }

    let favorites_shown = state.any_favorites();
    if !favorites_shown && state.favorites_only {
        debug!("favorites set drained; disabling favorites filter");
        state.favorites_only = false;
    }

    if state.day_active.values().all(|&active| !active) {
        debug!("all days inactive; clearing");
        return VisibilityPass::cleared(day_controls, favorites_shown);
    }

    let visible: Vec<Event> = events
        .iter()
        .filter(|event| is_visible(event, state, now))
        .cloned()
        .collect();

    debug!(visible = visible.len(), total = events.len(), "composed visibility");

    VisibilityPass {
        visible,
        day_controls,
        favorites_shown,
        directive: RenderDirective::Draw,
    }
}
