use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str = "lineup-time.toml";
const TIMEZONE_ENV_VAR: &str = "LINEUP_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str = "LINEUP_TIME_CONFIG";
const DEFAULT_SCHEDULE_TIMEZONE: &str = "America/Chicago";

/// A wall-clock time of day parsed from the schedule's time-range column.
pub type ClockTime = (u32, u32);

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
    timezone: Option<String>,
    time: Option<TimezoneSection>,
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
    timezone: Option<String>,
}

/// The timezone the schedule's dates and clock times are written in.
pub fn schedule_timezone() -> &'static Tz {
    static SCHEDULE_TZ: OnceLock<Tz> = OnceLock::new();
    SCHEDULE_TZ.get_or_init(resolve_schedule_timezone)
}

fn resolve_schedule_timezone() -> Tz {
    if let Ok(raw) = std::env::var(TIMEZONE_ENV_VAR)
        && let Some(tz) = parse_timezone(&raw, TIMEZONE_ENV_VAR)
    {
        return tz;
    }

    if let Some(path) = timezone_config_path()
        && let Some(tz) = load_timezone_from_file(&path)
    {
        return tz;
    }

    parse_timezone(DEFAULT_SCHEDULE_TIMEZONE, "DEFAULT_SCHEDULE_TIMEZONE").unwrap_or_else(|| {
        tracing::error!("failed to parse fallback timezone; using UTC");
        chrono_tz::UTC
    })
}

fn timezone_config_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var(TIMEZONE_CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    std::env::current_dir()
        .ok()
        .map(|dir| dir.join(TIMEZONE_CONFIG_FILE))
}

fn load_timezone_from_file(path: &PathBuf) -> Option<Tz> {
    if !path.exists() {
        return None;
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "failed reading timezone config file");
            return None;
        }
    };

    let parsed = match toml::from_str::<TimezoneConfig>(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::error!(file = %path.display(), error = %err, "failed parsing timezone config file");
            return None;
        }
    };

    let timezone = parsed
        .timezone
        .or_else(|| parsed.time.and_then(|section| section.timezone));
    let Some(timezone) = timezone else {
        tracing::warn!(file = %path.display(), "timezone config had no timezone field");
        return None;
    };

    parse_timezone(timezone.as_str(), &format!("file:{}", path.display()))
}

fn parse_timezone(raw: &str, source: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        tracing::warn!(source, "timezone source was empty");
        return None;
    }

    match trimmed.parse::<Tz>() {
        Ok(tz) => {
            tracing::info!(source, timezone = %trimmed, "configured schedule timezone");
            Some(tz)
        }
        Err(err) => {
            tracing::error!(source, timezone = %trimmed, error = %err, "failed to parse timezone id");
            None
        }
    }
}

fn to_utc_from_schedule_local(
    local_naive: NaiveDateTime,
    context: &str,
) -> anyhow::Result<DateTime<Utc>> {
    match schedule_timezone().from_local_datetime(&local_naive) {
        LocalResult::Single(local_dt) => Ok(local_dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => {
            tracing::warn!(
                context,
                first = %first,
                second = %second,
                "ambiguous local datetime; using earliest"
            );
            let chosen = if first <= second { first } else { second };
            Ok(chosen.with_timezone(&Utc))
        }
        LocalResult::None => Err(anyhow!(
            "local datetime does not exist in schedule timezone: {context}"
        )),
    }
}

/// Combine a calendar day with a wall-clock time into an absolute instant.
pub fn combine(date: NaiveDate, clock: ClockTime) -> anyhow::Result<DateTime<Utc>> {
    let (hour, minute) = clock;
    let local = date
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| anyhow!("invalid clock time {hour}:{minute:02} on {date}"))?;
    to_utc_from_schedule_local(local, "schedule-entry")
}

/// Same as [`combine`] but for the following calendar day, used when an
/// event's end clock rolls past midnight.
pub fn combine_next_day(date: NaiveDate, clock: ClockTime) -> anyhow::Result<DateTime<Utc>> {
    let next = date
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| anyhow!("calendar overflow after {date}"))?;
    combine(next, clock)
}

/// Parse `"10:00 AM"` / `"3:23pm"` / `"15:23"` into a 24-hour clock time.
pub fn parse_clock_time(token: &str) -> Option<ClockTime> {
    let clock_re =
        Regex::new(r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$").ok()?;
    let captures = clock_re.captures(token.trim())?;

    let raw_hour = captures.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = captures.name("minute")?.as_str().parse::<u32>().ok()?;
    if minute > 59 {
        return None;
    }

    let hour = if let Some(ampm_match) = captures.name("ampm") {
        let ampm = ampm_match.as_str().to_ascii_lowercase();
        if raw_hour == 0 || raw_hour > 12 {
            return None;
        }
        match ampm.as_str() {
            "am" => {
                if raw_hour == 12 {
                    0
                } else {
                    raw_hour
                }
            }
            "pm" => {
                if raw_hour == 12 {
                    12
                } else {
                    raw_hour + 12
                }
            }
            _ => return None,
        }
    } else {
        if raw_hour > 23 {
            return None;
        }
        raw_hour
    };

    Some((hour, minute))
}

/// Split a `"10:00 AM - 11:30 PM"` range into start and end clock times.
pub fn parse_time_range(raw: &str) -> Option<(ClockTime, ClockTime)> {
    let (start_raw, end_raw) = raw.split_once('-')?;
    let start = parse_clock_time(start_raw)?;
    let end = parse_clock_time(end_raw)?;
    Some((start, end))
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%m/%d/%Y",
];

/// Parse the schedule's calendar-day column. Accepts ISO dates plus the
/// human forms the source data uses ("March 8, 2024").
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}

/// Canonical day key used by the preference store.
pub fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
