//! Field extraction: raw event blocks to [`Event`] values.
//!
//! Extraction never fails. A field that is missing or malformed takes its
//! default (empty text, `0`, or [`ZERO_TIME`]) and the problem is logged.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalfeed_core::{
    Attendee, CalendarId, Event, Geo, ZERO_TIME, is_midnight_in, local_to_utc, resolve_timezone,
    timezone_or_utc,
};
use regex::Regex;
use tracing::{debug, trace};

use crate::directive::{Directive, Directives};

/// Date-time layout, e.g. `20140714T100000Z` (the `Z` is optional).
const DATE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Date layout for whole-day values, e.g. `20140714`.
const DATE_FORMAT: &str = "%Y%m%d";

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([+-])?P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$",
    )
    .expect("duration regex is valid")
});

static MAILTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mailto:(.*)").expect("mailto regex is valid"));

/// Returns the first capture group of the first match, or an empty string.
pub fn extract(pattern: &Regex, text: &str) -> String {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Parses an integer, defaulting to `0`.
pub fn parse_integer(text: &str) -> u32 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }
    text.parse().unwrap_or_else(|_| {
        debug!(value = %text, "Invalid integer, using 0");
        0
    })
}

/// Parses a `YYYYMMDDTHHMMSS[Z]` timestamp as UTC, defaulting to [`ZERO_TIME`].
pub fn parse_timestamp(text: &str) -> DateTime<Utc> {
    parse_utc(text).unwrap_or_else(|| {
        if !text.trim().is_empty() {
            debug!(value = %text, "Invalid timestamp, using zero time");
        }
        ZERO_TIME
    })
}

fn parse_utc(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let naive = NaiveDateTime::parse_from_str(text.trim_end_matches('Z'), DATE_TIME_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// A parsed `DTSTART`/`DTEND` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTime {
    pub instant: DateTime<Utc>,
    /// The `TZID` parameter as written, possibly empty.
    pub tzid: String,
    /// The value was a bare date (`VALUE=DATE`).
    pub date_only: bool,
}

impl Default for ParsedTime {
    fn default() -> Self {
        Self {
            instant: ZERO_TIME,
            tzid: String::new(),
            date_only: false,
        }
    }
}

/// Interprets a date or date-time directive.
///
/// Handles three encodings:
/// - `DTSTART;VALUE=DATE:20160901` (whole day, midnight UTC)
/// - `DTSTART;TZID=Europe/Sofia:20250101T090000` (local time in that zone)
/// - `DTSTART:20140714T100000Z` (UTC, the trailing `Z` is optional)
///
/// A `TZID` that does not resolve is treated as UTC.
pub fn parse_time(directive: Option<&Directive>) -> ParsedTime {
    let Some(directive) = directive else {
        return ParsedTime::default();
    };

    let value = directive.value.trim();
    let tzid = directive.param_or_empty("TZID").to_string();
    let date_only = directive
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || is_date(value);

    let instant = if date_only {
        parse_date(value)
    } else {
        parse_date_time(value, resolve_timezone(&tzid).as_ref())
    };

    let instant = instant.unwrap_or_else(|| {
        debug!(directive = %directive.name, value = %value, "Invalid date-time, using zero time");
        ZERO_TIME
    });

    ParsedTime {
        instant,
        tzid,
        date_only,
    }
}

fn is_date(value: &str) -> bool {
    value.len() == 8 && value.chars().all(|c| c.is_ascii_digit())
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Parses a date-time value; a trailing `Z` means UTC, otherwise the time
/// is local to `tz` (UTC when `None`).
pub fn parse_date_time(value: &str, tz: Option<&Tz>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.ends_with('Z') {
        return parse_utc(value);
    }
    let naive = NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT).ok()?;
    Some(match tz {
        Some(tz) => local_to_utc(naive, tz),
        None => Utc.from_utc_datetime(&naive),
    })
}

/// Parses either a bare date or a date-time, as found in `UNTIL`.
pub fn parse_date_or_time(value: &str, tz: Option<&Tz>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if is_date(value) {
        parse_date(value)
    } else {
        parse_date_time(value, tz)
    }
}

/// Parses an ISO 8601 duration such as `PT1H30M` or `P2DT3H`.
///
/// Returns zero for empty, malformed or negative durations.
pub fn parse_duration(text: &str) -> Duration {
    let text = text.trim();
    if text.is_empty() {
        return Duration::zero();
    }

    let Some(caps) = DURATION_RE.captures(text) else {
        debug!(value = %text, "Invalid duration, using zero");
        return Duration::zero();
    };
    if caps.get(1).is_some_and(|m| m.as_str() == "-") {
        debug!(value = %text, "Negative duration, using zero");
        return Duration::zero();
    }

    let part = |idx: usize| -> i64 {
        caps.get(idx)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let total = [
        Duration::try_weeks(part(2)),
        Duration::try_days(part(3)),
        Duration::try_hours(part(4)),
        Duration::try_minutes(part(5)),
        Duration::try_seconds(part(6)),
    ]
    .into_iter()
    .try_fold(Duration::zero(), |sum, piece| sum.checked_add(&piece?));

    total.unwrap_or_else(|| {
        debug!(value = %text, "Duration out of range, using zero");
        Duration::zero()
    })
}

/// Maps a three-letter English weekday name to its two-letter rule code.
///
/// Unknown names map to an empty string, which never matches a rule.
pub fn weekday_code(day: &str) -> &'static str {
    match day {
        "Mon" => "MO",
        "Tue" => "TU",
        "Wed" => "WE",
        "Thu" => "TH",
        "Fri" => "FR",
        "Sat" => "SA",
        "Sun" => "SU",
        _ => "",
    }
}

/// Builds an attendee from an `ATTENDEE` directive.
pub fn parse_attendee(directive: &Directive) -> Attendee {
    Attendee {
        name: directive.param_or_empty("CN").to_string(),
        email: extract(&MAILTO_RE, &directive.value).trim().to_string(),
        status: directive.param_or_empty("PARTSTAT").to_string(),
        role: directive.param_or_empty("ROLE").to_string(),
        cutype: directive.param_or_empty("CUTYPE").to_string(),
    }
}

/// All non-empty attendees of an event, in document order.
pub fn parse_attendees(directives: &Directives) -> Vec<Attendee> {
    directives
        .all("ATTENDEE")
        .map(parse_attendee)
        .filter(|a| !a.is_empty())
        .collect()
}

/// The event organizer. Only name and email are read.
pub fn parse_organizer(directives: &Directives) -> Option<Attendee> {
    let directive = directives.first("ORGANIZER")?;
    let organizer = Attendee {
        name: directive.param_or_empty("CN").to_string(),
        email: extract(&MAILTO_RE, &directive.value).trim().to_string(),
        ..Default::default()
    };
    (!organizer.is_empty()).then_some(organizer)
}

/// Reads a `GEO` value (`lat;long`). Requires both parts.
pub fn parse_geo(value: &str) -> Option<Geo> {
    let mut parts = value.split(';');
    let latitude = parts.next()?.trim();
    let longitude = parts.next()?.trim();
    if latitude.is_empty() && longitude.is_empty() {
        return None;
    }
    Some(Geo::new(latitude, longitude))
}

/// Builds one event from a raw `BEGIN:VEVENT` ... `END:VEVENT` block.
///
/// The end is derived as `start + DURATION` when it is missing or earlier
/// than the start. The stable id is generated last.
pub fn build_event(block: &str, calendar: CalendarId) -> Event {
    let directives = Directives::parse(block);
    let mut event = Event::new(calendar);

    let start = parse_time(directives.first("DTSTART"));
    let end = parse_time(directives.first("DTEND"));

    event.start = start.instant;
    event.end = end.instant;
    if event.end < event.start {
        let duration = parse_duration(directives.value("DURATION"));
        event.end = event.start.checked_add_signed(duration).unwrap_or_else(|| {
            debug!(start = %event.start, "Duration runs past the last date, using start");
            event.start
        });
    }
    event.whole_day = start.date_only
        || (is_midnight_in(event.start, &timezone_or_utc(&start.tzid))
            && is_midnight_in(event.end, &timezone_or_utc(&end.tzid)));
    event.start_tzid = start.tzid;
    event.end_tzid = end.tzid;

    event.imported_id = directives.value("UID").trim().to_string();
    event.summary = directives.value("SUMMARY").to_string();
    event.description = directives.value("DESCRIPTION").to_string();
    event.location = directives.value("LOCATION").to_string();
    event.class = directives.value("CLASS").trim().to_string();
    event.status = directives.value("STATUS").trim().to_string();
    event.rrule = directives.value("RRULE").trim().to_string();
    event.sequence = parse_integer(directives.value("SEQUENCE"));
    event.created = parse_timestamp(directives.value("CREATED"));
    event.modified = parse_timestamp(directives.value("LAST-MODIFIED"));
    event.geo = parse_geo(directives.value("GEO"));
    event.attendees = parse_attendees(&directives);
    event.organizer = parse_organizer(&directives);
    event.refresh_id();

    trace!(
        id = %event.id,
        uid = %event.imported_id,
        start = %event.start,
        attendees = event.attendees.len(),
        "Extracted event"
    );
    event
}
