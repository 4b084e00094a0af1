use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::event::{Event, EventId};

/// Display color for one event, spread around the hue wheel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hsl {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Hsl {
    /// `hue = (360 / n) * i` for the event at chronological index `i` of
    /// `n`. Saturation is kept slightly under full for softer colors.
    pub fn from_chronological_index(index: usize, total: usize) -> Self {
        let hue = if total == 0 {
            0.0
        } else {
            (360.0 / total as f32) * index as f32
        };
        Self {
            hue,
            saturation: 85.0,
            lightness: 50.0,
        }
    }
}

impl Default for Hsl {
    fn default() -> Self {
        Self::from_chronological_index(0, 1)
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({:.0}, {:.0}%, {:.0}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

/// Assign every event a color from its position in the chronologically
/// sorted *full* event list. The sort is stable, so input order breaks
/// start-time ties, and filtering never renumbers anything: an event keeps
/// the same color whether or not its neighbors are currently visible.
pub fn assign_colors(events: &[Event]) -> BTreeMap<EventId, Hsl> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&idx| events[idx].start);

    order
        .iter()
        .enumerate()
        .map(|(chrono_idx, &idx)| {
            (
                events[idx].id.clone(),
                Hsl::from_chronological_index(chrono_idx, events.len()),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{Hsl, assign_colors};
    use crate::event::{Event, EventId};

    fn event(name: &str, start_hour: u32) -> Event {
        let date = NaiveDate::from_ymd_opt(2024, 3, 8).expect("valid date");
        Event {
            id: EventId::derived(name, date),
            name: name.to_string(),
            date,
            start: Utc
                .with_ymd_and_hms(2024, 3, 8, start_hour, 0, 0)
                .single()
                .expect("valid start"),
            end: Utc
                .with_ymd_and_hms(2024, 3, 8, start_hour + 1, 0, 0)
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
    fn hues_divide_the_wheel_by_chronological_order() {
        // Input order is not chronological; colors follow start times.
        let events = vec![event("b", 12), event("a", 9), event("c", 15)];
        let colors = assign_colors(&events);

        assert_eq!(colors[&events[1].id].hue, 0.0);
        assert_eq!(colors[&events[0].id].hue, 120.0);
        assert_eq!(colors[&events[2].id].hue, 240.0);
    }

    #[test]
    fn colors_are_invariant_under_filtering() {
        let events = vec![event("a", 9), event("b", 12), event("c", 15)];
        let full = assign_colors(&events);

        // Filtering hands consumers a subset of events but never a new
        // color table: looking the survivors up in the full-set table
        // yields the same hues they had with everything visible.
        let visible: Vec<_> = events.iter().filter(|e| e.name != "a").collect();
        assert_eq!(full[&visible[0].id].hue, 120.0);
        assert_eq!(full[&visible[1].id].hue, 240.0);
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn start_time_ties_keep_input_order() {
        let events = vec![event("first", 9), event("second", 9)];
        let colors = assign_colors(&events);
        assert_eq!(colors[&events[0].id].hue, 0.0);
        assert_eq!(colors[&events[1].id].hue, 180.0);
    }

    #[test]
    fn renders_as_css_hsl() {
        let color = Hsl::from_chronological_index(1, 3);
        assert_eq!(color.to_string(), "hsl(120, 85%, 50%)");
    }
}
