use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, instrument};

use crate::event::{Event, EventId};

/// Row assignments for one visibility pass. Row indices are per calendar
/// day: row 0 on one day has no relation to row 0 on another. `row_count`
/// is the maximum number of rows any single day needed, which fixes the
/// overall display height.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    rows: BTreeMap<EventId, usize>,
    pub row_count: usize,
    pub extent: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Layout {
    pub fn row_of(&self, id: &EventId) -> Option<usize> {
        self.rows.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Greedy first-fit interval packing, per calendar day.
///
/// Events are stable-sorted by start time (input order breaks ties), then
/// each is placed in the lowest-indexed row whose latest end time is at or
/// before the event's start; if none fits, a new row is appended. The
/// result is deterministic for a given input order. It is not guaranteed
/// to be the theoretical minimum number of rows, and downstream consumers
/// depend on exactly this layout, so the strategy must not change.
#[instrument(skip(events), fields(count = events.len()))]
pub fn pack(events: &[Event]) -> Layout {
    if events.is_empty() {
        return Layout::default();
    }

    let mut days: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (idx, event) in events.iter().enumerate() {
        days.entry(event.date).or_default().push(idx);
    }

    let mut rows = BTreeMap::new();
    let mut row_count = 0;

    for day_indices in days.values() {
        let mut order = day_indices.clone();
        order.sort_by_key(|&idx| events[idx].start);

        let mut row_ends: Vec<DateTime<Utc>> = Vec::new();
        for &idx in &order {
            let event = &events[idx];
            let row = match row_ends.iter().position(|&end| end <= event.start) {
                Some(row) => {
                    row_ends[row] = event.end;
                    row
                }
                None => {
                    row_ends.push(event.end);
                    row_ends.len() - 1
                }
            };
            rows.insert(event.id.clone(), row);
        }

        row_count = row_count.max(row_ends.len());
    }

    let extent = time_extent(events);
    debug!(days = days.len(), row_count, "packed rows");

    Layout {
        rows,
        row_count,
        extent,
    }
}

/// Minimum start and maximum end across a set of events; the shared
/// horizontal time scale for both views. `None` for an empty set: there
/// is no defined domain, and callers must not attempt a layout pass.
pub fn time_extent(events: &[Event]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = events.iter().map(|event| event.start).min()?;
    let end = events.iter().map(|event| event.end).max()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{Layout, pack, time_extent};
    use crate::event::{Event, EventId};

    fn event(name: &str, day: u32, start: (u32, u32), end: (u32, u32)) -> Event {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).expect("valid date");
        Event {
            id: EventId::derived(name, date),
            name: name.to_string(),
            date,
            start: Utc
                .with_ymd_and_hms(2024, 3, day, start.0, start.1, 0)
                .single()
                .expect("valid start"),
            end: Utc
                .with_ymd_and_hms(2024, 3, day, end.0, end.1, 0)
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

    #[test]
    fn single_event_occupies_row_zero() {
        let events = vec![event("solo", 8, (10, 0), (11, 0))];
        let layout = pack(&events);
        assert_eq!(layout.row_of(&events[0].id), Some(0));
        assert_eq!(layout.row_count, 1);
    }

    #[test]
    fn empty_input_yields_empty_layout_and_no_extent() {
        let layout = pack(&[]);
        assert_eq!(layout, Layout::default());
        assert!(layout.is_empty());
        assert!(layout.extent.is_none());
        assert!(time_extent(&[]).is_none());
    }

    #[test]
    fn back_to_back_events_reuse_a_row() {
        // The worked example: [10:00,11:00), [10:30,11:30), [11:00,12:00)
        // must pack to rows {0, 1, 0}; the third starts exactly when the
        // first ends, so it slots back into row 0.
        let events = vec![
            event("a", 8, (10, 0), (11, 0)),
            event("b", 8, (10, 30), (11, 30)),
            event("c", 8, (11, 0), (12, 0)),
        ];
        let layout = pack(&events);
        assert_eq!(layout.row_of(&events[0].id), Some(0));
        assert_eq!(layout.row_of(&events[1].id), Some(1));
        assert_eq!(layout.row_of(&events[2].id), Some(0));
        assert_eq!(layout.row_count, 2);
    }

    #[test]
    fn packing_is_deterministic() {
        let events = vec![
            event("a", 8, (10, 0), (12, 0)),
            event("b", 8, (10, 0), (11, 0)),
            event("c", 8, (11, 30), (13, 0)),
            event("d", 8, (12, 0), (14, 0)),
        ];
        let first = pack(&events);
        for _ in 0..10 {
            assert_eq!(pack(&events), first);
        }
    }

    #[test]
    fn start_time_ties_break_by_input_order() {
        let events = vec![
            event("later in file", 8, (10, 0), (11, 0)),
            event("earlier in file", 8, (10, 0), (11, 0)),
        ];
        let layout = pack(&events);
        assert_eq!(layout.row_of(&events[0].id), Some(0));
        assert_eq!(layout.row_of(&events[1].id), Some(1));
    }

    #[test]
    fn days_pack_independently() {
        let events = vec![
            event("fri-a", 8, (10, 0), (11, 0)),
            event("fri-b", 8, (10, 0), (11, 0)),
            event("fri-c", 8, (10, 0), (11, 0)),
            event("sat-a", 9, (10, 0), (11, 0)),
        ];
        let layout = pack(&events);
        assert_eq!(layout.row_of(&events[3].id), Some(0));
        // Display height is the widest day.
        assert_eq!(layout.row_count, 3);
    }

    #[test]
    fn no_two_events_share_a_row_and_overlap() {
        let events = vec![
            event("a", 8, (10, 0), (12, 0)),
            event("b", 8, (10, 15), (10, 45)),
            event("c", 8, (10, 30), (11, 30)),
            event("d", 8, (11, 0), (11, 15)),
            event("e", 8, (11, 45), (13, 0)),
            event("f", 9, (10, 0), (12, 0)),
            event("g", 9, (11, 0), (13, 0)),
        ];
        let layout = pack(&events);

        for first in &events {
            for second in &events {
                if first.id == second.id || first.date != second.date {
                    continue;
                }
                if layout.row_of(&first.id) == layout.row_of(&second.id) {
                    assert!(
                        !first.overlaps(second),
                        "{} and {} share a row but overlap",
                        first.name,
                        second.name
                    );
                }
            }
        }
    }

    #[test]
    fn extent_spans_min_start_to_max_end() {
        let events = vec![
            event("a", 8, (10, 0), (11, 0)),
            event("b", 9, (9, 0), (22, 0)),
        ];
        let (start, end) = time_extent(&events).expect("extent");
        assert_eq!(start, events[0].start);
        assert_eq!(end, events[1].end);
    }
}
