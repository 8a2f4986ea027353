//! Core types: events, calendars, time helpers and logging setup

pub mod calendar;
pub mod error;
pub mod event;
pub mod time;
pub mod tracing;

pub use calendar::Calendar;
pub use error::{GeoError, LookupError, LookupResult};
pub use event::{Attendee, CalendarId, Event, Geo};
pub use time::{
    DaySpan, ZERO_TIME, is_midnight_in, local_to_utc, resolve_timezone, timezone_or_utc,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
