//! Time helpers shared by the parser and the calendar index.
//!
//! Event instants are always stored in UTC. Time zones only matter at two
//! edges: when a `TZID`-qualified local time is read from a document, and
//! when an event is mapped onto calendar days by [`DaySpan`].

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// The value used for timestamps that are absent or malformed.
pub const ZERO_TIME: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Looks up an IANA time zone identifier.
///
/// Returns `None` for an empty identifier or one the time zone database
/// does not know (e.g. Windows names such as `Romance Standard Time`).
pub fn resolve_timezone(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    match name.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            debug!(tzid = %name, "Unknown time zone identifier");
            None
        }
    }
}

/// Looks up a time zone identifier, falling back to UTC.
pub fn timezone_or_utc(name: &str) -> Tz {
    resolve_timezone(name).unwrap_or(Tz::UTC)
}

/// Interprets a wall-clock time in `tz` and converts it to UTC.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times in
/// a DST gap are shifted forward by one hour.
pub fn local_to_utc(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

/// Returns `true` when the instant falls exactly on midnight UTC.
pub fn is_midnight(dt: DateTime<Utc>) -> bool {
    dt.time() == NaiveTime::MIN
}

/// Returns `true` when the instant is midnight on the wall clock of `tz`.
pub fn is_midnight_in(dt: DateTime<Utc>, tz: &Tz) -> bool {
    dt.with_timezone(tz).time() == NaiveTime::MIN
}

/// The inclusive range of calendar days an event occupies.
///
/// The end instant is exclusive: an event ending exactly at midnight does
/// not occupy the day that midnight starts, unless it also starts there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    first: NaiveDate,
    last: NaiveDate,
}

impl DaySpan {
    /// Computes the days covered by `[start, end]` in the given time zone.
    pub fn of<Z: TimeZone>(start: DateTime<Utc>, end: DateTime<Utc>, tz: &Z) -> Self {
        let first = start.with_timezone(tz).date_naive();
        let local_end = end.with_timezone(tz);
        let mut last = local_end.date_naive();

        if end > start && local_end.time() == NaiveTime::MIN && last > first {
            last = last.pred_opt().unwrap_or(last);
        }
        if last < first {
            last = first;
        }

        Self { first, last }
    }

    /// The first day of the span.
    pub fn first(&self) -> NaiveDate {
        self.first
    }

    /// The last day of the span (inclusive).
    pub fn last(&self) -> NaiveDate {
        self.last
    }

    /// Number of days in the span. Always at least one.
    pub fn len(&self) -> usize {
        (self.last - self.first).num_days() as usize + 1
    }

    /// Returns `true` if `date` lies within the span.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }

    /// Iterates over every day in the span, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let last = self.last;
        self.first.iter_days().take_while(move |d| *d <= last)
    }
}
