//! Event types parsed from calendar documents.
//!
//! This module provides the value objects a calendar is made of:
//! - [`Event`]: one concrete occurrence with its attributes and identity
//! - [`Attendee`]: an attendee or organizer directive
//! - [`Geo`]: a lazily parsed coordinate pair
//! - [`CalendarId`]: the non-owning link from an event to its calendar

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GeoError;
use crate::time::{DaySpan, ZERO_TIME, timezone_or_utc};

/// Format used when rendering events for humans.
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifies the calendar an event belongs to.
///
/// Events hold this id instead of a reference; they are only ever reached
/// through their owning [`Calendar`](crate::Calendar).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalendarId(Uuid);

impl CalendarId {
    /// Generates a fresh, random calendar id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CalendarId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An attendee (or organizer) of an event.
///
/// All fields hold the raw text found in the directive. An attendee whose
/// fields are all empty is considered absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Display name (`CN` parameter).
    pub name: String,
    /// Mail address (the `mailto:` value).
    pub email: String,
    /// Participation status (`PARTSTAT`), e.g. `ACCEPTED`.
    pub status: String,
    /// Participation role (`ROLE`), e.g. `REQ-PARTICIPANT`.
    pub role: String,
    /// Calendar user type (`CUTYPE`), e.g. `INDIVIDUAL`.
    pub cutype: String,
}

impl Attendee {
    /// Creates an attendee with the given email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to set the participation status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Builder method to set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Returns true if no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.email.is_empty()
            && self.status.is_empty()
            && self.role.is_empty()
            && self.cutype.is_empty()
    }
}

impl fmt::Display for Attendee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} with email {}", self.name, self.email)
    }
}

/// Latitude and longitude from an event's `GEO` directive.
///
/// Both coordinates are kept as text and parsed on first access. A parsed
/// value is cached; a parse failure is returned every time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geo {
    latitude: String,
    longitude: String,
    #[serde(skip)]
    lat: OnceLock<f64>,
    #[serde(skip)]
    long: OnceLock<f64>,
}

impl Geo {
    /// Creates a geo point from its textual coordinates.
    pub fn new(latitude: impl Into<String>, longitude: impl Into<String>) -> Self {
        Self {
            latitude: latitude.into(),
            longitude: longitude.into(),
            lat: OnceLock::new(),
            long: OnceLock::new(),
        }
    }

    /// The latitude as written in the document.
    pub fn latitude_text(&self) -> &str {
        &self.latitude
    }

    /// The longitude as written in the document.
    pub fn longitude_text(&self) -> &str {
        &self.longitude
    }

    /// Parses (once) and returns the latitude.
    pub fn latitude(&self) -> Result<f64, GeoError> {
        parse_cached(&self.lat, &self.latitude, "latitude")
    }

    /// Parses (once) and returns the longitude.
    pub fn longitude(&self) -> Result<f64, GeoError> {
        parse_cached(&self.long, &self.longitude, "longitude")
    }
}

impl PartialEq for Geo {
    fn eq(&self, other: &Self) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

fn parse_cached(cell: &OnceLock<f64>, text: &str, axis: &'static str) -> Result<f64, GeoError> {
    if let Some(value) = cell.get() {
        return Ok(*value);
    }
    let value = text
        .trim()
        .parse::<f64>()
        .map_err(|e| GeoError::new(axis, text, e))?;
    Ok(*cell.get_or_init(|| value))
}

/// One calendar occurrence.
///
/// Events are built by the parser and committed to a
/// [`Calendar`](crate::Calendar). `id` is derived from the other fields by
/// [`Event::generate_id`] and must be refreshed whenever the times change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier (hex MD5, see [`Event::generate_id`]).
    pub id: String,

    /// Identifier from the source document (`UID`), may be empty.
    pub imported_id: String,

    /// When the event starts.
    pub start: DateTime<Utc>,

    /// When the event ends. Never before `start`.
    pub end: DateTime<Utc>,

    /// `TZID` parameter of the start directive, if any.
    pub start_tzid: String,

    /// `TZID` parameter of the end directive, if any.
    pub end_tzid: String,

    /// `CREATED` timestamp, [`ZERO_TIME`] when absent.
    pub created: DateTime<Utc>,

    /// `LAST-MODIFIED` timestamp, [`ZERO_TIME`] when absent.
    pub modified: DateTime<Utc>,

    pub summary: String,

    pub description: String,

    pub location: String,

    /// Access classification (`CLASS`), e.g. `PUBLIC`.
    pub class: String,

    /// Raw status token, e.g. `CONFIRMED`, `TENTATIVE`, `CANCELLED`.
    pub status: String,

    /// Raw recurrence rule (`RRULE` value), empty for single events.
    pub rrule: String,

    /// `SEQUENCE` from the document, or the 1-based ordinal of an expanded
    /// occurrence.
    pub sequence: u32,

    /// Whether the event covers whole days rather than a time range.
    pub whole_day: bool,

    pub geo: Option<Geo>,

    pub attendees: Vec<Attendee>,

    pub organizer: Option<Attendee>,

    /// The calendar this event was committed to.
    pub calendar: CalendarId,
}

impl Event {
    /// Creates an empty event belonging to `calendar`.
    pub fn new(calendar: CalendarId) -> Self {
        Self {
            id: String::new(),
            imported_id: String::new(),
            start: ZERO_TIME,
            end: ZERO_TIME,
            start_tzid: String::new(),
            end_tzid: String::new(),
            created: ZERO_TIME,
            modified: ZERO_TIME,
            summary: String::new(),
            description: String::new(),
            location: String::new(),
            class: String::new(),
            status: String::new(),
            rrule: String::new(),
            sequence: 0,
            whole_day: false,
            geo: None,
            attendees: Vec::new(),
            organizer: None,
            calendar,
        }
    }

    /// Builder method to set start and end, refreshing the id.
    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = start;
        self.end = end.max(start);
        self.refresh_id();
        self
    }

    /// Builder method to set the summary, refreshing the id.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self.refresh_id();
        self
    }

    /// Builder method to set the description, refreshing the id.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self.refresh_id();
        self
    }

    /// Builder method to set the imported id, refreshing the id.
    pub fn with_imported_id(mut self, imported_id: impl Into<String>) -> Self {
        self.imported_id = imported_id.into();
        self.refresh_id();
        self
    }

    /// Builder method to set the recurrence rule.
    pub fn with_rrule(mut self, rrule: impl Into<String>) -> Self {
        self.rrule = rrule.into();
        self
    }

    /// Derives the stable identifier.
    ///
    /// Hashes start, end and the imported id when one is present, otherwise
    /// start, end, summary and description. Re-parsing the same document
    /// therefore yields the same ids, and occurrences of one recurring event
    /// get distinct ids because their times differ.
    pub fn generate_id(&self) -> String {
        let start = self.start.to_rfc3339();
        let end = self.end.to_rfc3339();
        let material = if self.imported_id.is_empty() {
            format!("{start}{end}{}{}", self.summary, self.description)
        } else {
            format!("{start}{end}{}", self.imported_id)
        };
        format!("{:x}", md5::compute(material.as_bytes()))
    }

    /// Recomputes `id` from the current fields.
    pub fn refresh_id(&mut self) {
        self.id = self.generate_id();
    }

    /// Creates an occurrence of this event at new times.
    ///
    /// The occurrence carries a fresh id and `sequence` as its ordinal.
    pub fn occurrence(&self, start: DateTime<Utc>, end: DateTime<Utc>, sequence: u32) -> Self {
        let mut occurrence = self.clone();
        occurrence.start = start;
        occurrence.end = end;
        occurrence.sequence = sequence;
        occurrence.refresh_id();
        occurrence
    }

    /// The event's duration.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The days the event occupies in a calendar shown in `tz`.
    ///
    /// Whole-day events keep the dates they were written with, so they are
    /// mapped in their own `TZID` zone (UTC for plain dates) instead.
    pub fn day_span(&self, tz: &Tz) -> DaySpan {
        if self.whole_day {
            DaySpan::of(self.start, self.end, &timezone_or_utc(&self.start_tzid))
        } else {
            DaySpan::of(self.start, self.end, tz)
        }
    }

    /// Returns true if the event carries a recurrence rule.
    pub fn is_recurring(&self) -> bool {
        !self.rrule.trim().is_empty()
    }

    /// Returns true if the event status is `CANCELLED`.
    pub fn is_cancelled(&self) -> bool {
        self.status.eq_ignore_ascii_case("cancelled")
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event({}) from {} to {} about {}. {} people are invited to it",
            self.status,
            self.start.format(DISPLAY_FORMAT),
            self.end.format(DISPLAY_FORMAT),
            self.summary,
            self.attendees.len()
        )
    }
}
