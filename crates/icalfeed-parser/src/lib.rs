//! Calendar document parsing.
//!
//! [`parse_document`] turns the text of one calendar into an indexed
//! [`Calendar`](icalfeed_core::Calendar):
//!
//! 1. [`split_document`] separates header lines from `VEVENT` blocks
//! 2. [`build_event`] extracts typed fields from each block
//! 3. [`expand`] adds occurrences for recurring events, when enabled
//! 4. every event is committed to the calendar's indexes

pub mod directive;
pub mod document;
pub mod extract;
pub mod recurrence;

pub use directive::{Directive, Directives, unfold};
pub use document::{ParseOptions, SplitDocument, parse_document, split_document};
pub use extract::{build_event, extract, weekday_code};
pub use recurrence::{ExpandOptions, Frequency, RecurrenceRule, expand};
