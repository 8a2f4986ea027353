//! Whole-document parsing: header metadata plus event blocks.

use icalfeed_core::{Calendar, resolve_timezone};
use tracing::{debug, info, warn};

use crate::directive::{Directives, unfold};
use crate::extract::build_event;
use crate::recurrence::{ExpandOptions, expand};

/// Options controlling how a document becomes a [`Calendar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Expand events carrying an `RRULE` into additional occurrences.
    pub expand_recurrences: bool,
    /// Upper bound on occurrences per recurring event.
    pub max_repeats: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            expand_recurrences: false,
            max_repeats: ExpandOptions::default().max_repeats,
        }
    }
}

impl ParseOptions {
    #[must_use]
    pub fn with_expansion(mut self, max_repeats: usize) -> Self {
        self.expand_recurrences = true;
        self.max_repeats = max_repeats;
        self
    }
}

/// A document split into its header text and raw event blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitDocument {
    /// All lines outside `VEVENT` blocks.
    pub header: String,
    /// One entry per `BEGIN:VEVENT` ... `END:VEVENT` block, delimiters
    /// included. Nested components (e.g. `VALARM`) are left out.
    pub events: Vec<String>,
}

/// Separates the calendar header from its event blocks.
///
/// An event block that is never closed is dropped.
pub fn split_document(text: &str) -> SplitDocument {
    let mut doc = SplitDocument::default();
    let mut current: Option<String> = None;
    let mut nested = 0usize;

    for line in unfold(text).lines() {
        let trimmed = line.trim();
        let upper = trimmed.to_ascii_uppercase();

        if nested == 0 && upper == "END:VEVENT" {
            if let Some(mut block) = current.take() {
                block.push_str(trimmed);
                block.push('\n');
                doc.events.push(block);
                continue;
            }
        }

        match current.as_mut() {
            None if upper == "BEGIN:VEVENT" => {
                current = Some(format!("{trimmed}\n"));
            }
            None => {
                doc.header.push_str(line);
                doc.header.push('\n');
            }
            Some(block) => {
                if upper.starts_with("BEGIN:") {
                    nested += 1;
                } else if upper.starts_with("END:") && nested > 0 {
                    nested -= 1;
                } else if nested == 0 {
                    block.push_str(line);
                    block.push('\n');
                }
            }
        }
    }

    if current.is_some() {
        warn!("Unterminated VEVENT block dropped");
    }
    doc
}

/// Parses a calendar document into a fully indexed [`Calendar`].
///
/// `url` is recorded as the calendar's source. Parsing never fails: field
/// problems fall back to defaults and are logged.
pub fn parse_document(text: &str, url: &str, options: &ParseOptions) -> Calendar {
    let doc = split_document(text);
    let header = Directives::parse(&doc.header);

    let mut calendar = Calendar::new();
    calendar.url = url.to_string();
    calendar.name = header.value("X-WR-CALNAME").to_string();
    calendar.description = header.value("X-WR-CALDESC").to_string();

    let version = header.value("VERSION").trim();
    calendar.version = version.parse().unwrap_or_else(|_| {
        if !version.is_empty() {
            debug!(version = %version, "Invalid calendar version, using 0");
        }
        0.0
    });

    let tzid = header.value("X-WR-TIMEZONE").trim();
    match resolve_timezone(tzid) {
        Some(tz) => calendar.set_timezone(tz),
        None if !tzid.is_empty() => warn!(tzid = %tzid, "Unknown calendar time zone, using UTC"),
        None => {}
    }

    let expand_options = ExpandOptions {
        max_repeats: options.max_repeats,
    };
    let mut occurrences = 0usize;

    for block in &doc.events {
        let event = build_event(block, calendar.id());
        let extra = if options.expand_recurrences && event.is_recurring() {
            expand(&event, &expand_options)
        } else {
            Vec::new()
        };

        calendar.commit_event(event);
        for occurrence in extra {
            if calendar.commit_event(occurrence) {
                occurrences += 1;
            }
        }
    }

    info!(
        url = %url,
        name = %calendar.name,
        blocks = doc.events.len(),
        occurrences,
        events = calendar.len(),
        "Parsed calendar"
    );
    calendar
}
