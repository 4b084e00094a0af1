use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime;
use crate::engine::VisibleEvent;
use crate::filter::DayControl;

/// Terminal stand-in for the graphical map/timeline renderer: consumes the
/// engine's visible set and derived control state, draws tables.
#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, visible))]
    pub fn print_schedule(&mut self, visible: &[VisibleEvent]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        if visible.is_empty() {
            writeln!(out, "Nothing to show.")?;
            return Ok(());
        }

        let headers = vec![
            "Day".to_string(),
            "Row".to_string(),
            "Time".to_string(),
            "Event".to_string(),
            "Tags".to_string(),
            "Location".to_string(),
            "Color".to_string(),
        ];

        let mut rows = Vec::with_capacity(visible.len());
        for entry in visible {
            let event = &entry.event;
            let tz = datetime::schedule_timezone();
            let time = format!(
                "{} - {}",
                event.start.with_timezone(tz).format("%I:%M %p"),
                event.end.with_timezone(tz).format("%I:%M %p")
            );
            let tags = event
                .tags
                .iter()
                .map(|tag| format!("+{tag}"))
                .collect::<Vec<_>>()
                .join(" ");
            let day = self.paint(&datetime::format_day(event.date), "33");
            // Marker-less events have no location to point a map pin at.
            let location = event.location.clone().unwrap_or_default();

            rows.push(vec![
                day,
                entry.row.to_string(),
                time,
                event.name.clone(),
                tags,
                location,
                entry.color.to_string(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, controls))]
    pub fn print_day_controls(
        &mut self,
        controls: &[DayControl],
        favorites_shown: bool,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for control in controls {
            if !control.shown {
                continue;
            }
            let mark = if control.active { "[x]" } else { "[ ]" };
            writeln!(out, "{mark} {}", datetime::format_day(control.date))?;
        }

        let hidden = controls.iter().filter(|control| !control.shown).count();
        if hidden > 0 {
            writeln!(out, "({hidden} past day(s) hidden)")?;
        }

        writeln!(
            out,
            "favorites filter: {}",
            if favorites_shown { "available" } else { "hidden" }
        )?;
        Ok(())
    }

    pub fn print_extent(
        &mut self,
        extent: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match extent {
            Some((start, end)) => {
                let tz = datetime::schedule_timezone();
                writeln!(
                    out,
                    "{} - {}",
                    start.with_timezone(tz).format("%Y-%m-%d %I:%M %p"),
                    end.with_timezone(tz).format("%Y-%m-%d %I:%M %p")
                )?;
            }
            None => {
                writeln!(out, "No visible events; time scale undefined.")?;
            }
        }
        Ok(())
    }

    pub fn print_cleared(&mut self) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "All days switched off; cleared map and timeline.")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
