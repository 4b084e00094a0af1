use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use tracing::{debug, instrument, warn};

use crate::datetime;
use crate::event::{Coordinates, DEFAULT_IMAGE, Event, EventId};

/// Coordinate columns carry this placeholder while a venue is unconfirmed.
const COORDINATE_SENTINEL: &str = "TBD";

/// Read and normalize the schedule file. The only hard failures are an
/// unreadable file or undecodable text; individual bad records are skipped.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_schedule(path: &Path) -> anyhow::Result<Vec<Event>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read schedule {}", path.display()))?;
    Ok(parse_schedule(&text))
}

/// Parse tab-separated schedule text. The first row is a header and is
/// always skipped; blank rows are ignored; rows without a usable name,
/// date, or time range are dropped with a warning.
#[instrument(skip(text))]
pub fn parse_schedule(text: &str) -> Vec<Event> {
    let mut events = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        if idx == 0 || line.trim().is_empty() {
            continue;
        }

        match parse_record(line) {
            Ok(event) => events.push(event),
            Err(err) => {
                warn!(line = idx + 1, error = %err, "skipping malformed schedule record");
            }
        }
    }

    debug!(count = events.len(), "normalized schedule records");
    events
}

/// Columns: name, date, time-range, latitude, longitude, location, tags,
/// RSVP URL, image reference, description, optional external id.
fn parse_record(line: &str) -> anyhow::Result<Event> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    let field = |idx: usize| fields.get(idx).copied().unwrap_or("");

    let name = field(0);
    if name.is_empty() {
        return Err(anyhow!("missing event name"));
    }

    let date = datetime::parse_calendar_date(field(1))
        .ok_or_else(|| anyhow!("unparsable date: {:?}", field(1)))?;

    let (start_clock, end_clock) = datetime::parse_time_range(field(2))
        .ok_or_else(|| anyhow!("unparsable time range: {:?}", field(2)))?;

    let start = datetime::combine(date, start_clock)?;
    let mut end = datetime::combine(date, end_clock)?;
    if end <= start {
        // End clock at or before the start clock means the event runs past
        // midnight into the next calendar day.
        end = datetime::combine_next_day(date, end_clock)?;
    }

    let coordinates = parse_coordinates(field(3), field(4));

    let tags: Vec<String> = field(6)
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect();

    let location = non_empty(field(5));
    let rsvp_url = non_empty(field(7));

    let image = match field(8) {
        "" => DEFAULT_IMAGE.to_string(),
        img => img.to_string(),
    };

    let id = match field(10) {
        "" => EventId::derived(name, date),
        external => EventId::new(external),
    };

    Ok(Event {
        id,
        name: name.to_string(),
        date,
        start,
        end,
        location,
        coordinates,
        tags,
        rsvp_url,
        image,
        description: field(9).to_string(),
    })
}

/// Coordinates exist only when both columns hold parseable numbers. The
/// `TBD` placeholder and malformed numeric text both mean "no marker",
/// never an error.
fn parse_coordinates(lat_raw: &str, lon_raw: &str) -> Option<Coordinates> {
    if lat_raw.is_empty()
        || lon_raw.is_empty()
        || lat_raw == COORDINATE_SENTINEL
        || lon_raw == COORDINATE_SENTINEL
    {
        return None;
    }

    let lat = lat_raw.parse::<f64>().ok()?;
    let lon = lon_raw.parse::<f64>().ok()?;
    Some(Coordinates { lat, lon })
}

fn non_empty(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
