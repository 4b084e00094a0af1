use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Image reference used when a record leaves the field blank.
pub const DEFAULT_IMAGE: &str = "default.png";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Fallback identity for records without an external id. Deterministic:
    /// the same name and date always produce the same id.
    pub fn derived(name: &str, date: NaiveDate) -> Self {
        Self(format!("{name}@{date}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// A normalized schedule entry. Immutable once built; everything derived
/// from it (row, color, visibility) is recomputed, never stored back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,

    pub name: String,

    /// Calendar day used for grouping and day-filter matching. An event
    /// rolling past midnight still belongs to the day it starts on.
    pub date: NaiveDate,

    pub start: DateTime<Utc>,

    pub end: DateTime<Utc>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub coordinates: Option<Coordinates>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub rsvp_url: Option<String>,

    pub image: String,

    #[serde(default)]
    pub description: String,
}

impl Event {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && other.start < self.end
    }
}
