//! Error types for calendar lookups and value parsing.

use std::num::ParseFloatError;

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for calendar lookups.
pub type LookupResult<T> = Result<T, LookupError>;

/// A lookup against a calendar's indexes found nothing.
///
/// Lookups never fall back to an empty value: an empty result would be
/// indistinguishable from a calendar that parsed correctly but is empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// No event carries this stable identifier.
    #[error("no event with id {0}")]
    EventNotFound(String),

    /// No event carries this identifier from the source document.
    #[error("no event with imported id {0}")]
    ImportedEventNotFound(String),

    /// No event spans the given day.
    #[error("no events on {0}")]
    NoEventsOnDay(NaiveDate),
}

/// A geographic coordinate could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {axis} {value:?}: {source}")]
pub struct GeoError {
    axis: &'static str,
    value: String,
    #[source]
    source: ParseFloatError,
}

impl GeoError {
    pub(crate) fn new(
        axis: &'static str,
        value: impl Into<String>,
        source: ParseFloatError,
    ) -> Self {
        Self {
            axis,
            value: value.into(),
            source,
        }
    }

    /// Which coordinate failed ("latitude" or "longitude").
    pub fn axis(&self) -> &'static str {
        self.axis
    }

    /// The text that failed to parse.
    pub fn value(&self) -> &str {
        &self.value
    }
}
