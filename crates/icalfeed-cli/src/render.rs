//! Output rendering for ingested calendars.
//!
//! The same [`Report`] feeds both the terminal text and the JSON output.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use icalfeed_core::{Calendar, CalendarId, Event};
use icalfeed_sources::SourceError;
use serde::Serialize;

use crate::config::Selection;

/// Everything one run produced.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub calendars: Vec<CalendarSummary<'a>>,
    pub errors: Vec<ErrorSummary>,
}

/// One calendar with the events picked by the [`Selection`].
#[derive(Debug, Serialize)]
pub struct CalendarSummary<'a> {
    pub id: CalendarId,
    pub name: &'a str,
    pub description: &'a str,
    pub url: &'a str,
    pub version: f64,
    pub timezone: &'static str,
    /// Total events in the calendar, selected or not.
    pub event_count: usize,
    pub events: Vec<&'a Event>,
    #[serde(skip)]
    tz: Tz,
}

#[derive(Debug, Serialize)]
pub struct ErrorSummary {
    pub source_id: Option<String>,
    pub code: &'static str,
    pub message: String,
}

impl<'a> CalendarSummary<'a> {
    pub fn new(calendar: &'a Calendar, selection: Selection, now: DateTime<Utc>) -> Self {
        let events = match selection {
            Selection::All => calendar.events().iter().collect(),
            Selection::Upcoming(n) => calendar.upcoming_after(now, n),
            Selection::Day(day) => calendar.events_on_day(day).unwrap_or_default(),
        };
        let tz = calendar.timezone();

        Self {
            id: calendar.id(),
            name: &calendar.name,
            description: &calendar.description,
            url: &calendar.url,
            version: calendar.version,
            timezone: tz.name(),
            event_count: calendar.len(),
            events,
            tz,
        }
    }
}

impl From<&SourceError> for ErrorSummary {
    fn from(err: &SourceError) -> Self {
        Self {
            source_id: err.source_id().map(str::to_string),
            code: err.code().as_str(),
            message: err.message().to_string(),
        }
    }
}

impl<'a> Report<'a> {
    /// Builds a report; `now` anchors [`Selection::Upcoming`].
    pub fn new(
        calendars: &'a [Arc<Calendar>],
        errors: &[Arc<SourceError>],
        selection: Selection,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            calendars: calendars
                .iter()
                .map(|c| CalendarSummary::new(c, selection, now))
                .collect(),
            errors: errors.iter().map(|e| ErrorSummary::from(e.as_ref())).collect(),
        }
    }

    /// Renders the report as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Renders the report for a terminal.
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        for calendar in &self.calendars {
            let name = if calendar.name.is_empty() {
                "(unnamed)"
            } else {
                calendar.name
            };
            let url = if calendar.url.is_empty() {
                "inline"
            } else {
                calendar.url
            };
            let _ = writeln!(out, "== {} [{}]", name, url);
            let _ = writeln!(
                out,
                "   version {:.1}, {}, {} event(s)",
                calendar.version, calendar.timezone, calendar.event_count
            );

            if calendar.events.is_empty() {
                out.push_str("   (no events)\n");
            }
            for event in &calendar.events {
                let _ = writeln!(out, "   {}", event_line(event, &calendar.tz));
            }
        }

        for error in &self.errors {
            match error.source_id {
                Some(ref id) => {
                    let _ = writeln!(out, "error: {}: {} ({})", id, error.message, error.code);
                }
                None => {
                    let _ = writeln!(out, "error: {} ({})", error.message, error.code);
                }
            }
        }

        out
    }
}

/// One event as a single line, times shown in the calendar's zone.
fn event_line(event: &Event, tz: &Tz) -> String {
    let start = event.start.with_timezone(tz);
    let end = event.end.with_timezone(tz);

    let when = if event.whole_day {
        let span = event.day_span(tz);
        if span.len() == 1 {
            format!("{} all day", span.first())
        } else {
            format!("{} - {} all day", span.first(), span.last())
        }
    } else if start.date_naive() == end.date_naive() {
        format!("{}-{}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"))
    } else {
        format!(
            "{} - {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        )
    };

    let summary = if event.summary.is_empty() {
        "(no title)"
    } else {
        event.summary.as_str()
    };

    let mut line = format!("{}  {}", when, summary);
    if !event.status.is_empty() {
        let _ = write!(line, " [{}]", event.status);
    }
    if event.sequence > 0 && !event.rrule.is_empty() {
        let _ = write!(line, " #{}", event.sequence);
    }
    line
}
