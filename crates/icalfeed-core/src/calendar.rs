//! The calendar entity and its event indexes.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, trace};

use crate::error::{LookupError, LookupResult};
use crate::event::{CalendarId, Event};

/// A parsed calendar: header metadata plus its events.
///
/// Events are only added through [`Calendar::commit_event`], which keeps
/// the event list and the three indexes consistent:
/// - by stable id (each event exactly once)
/// - by imported id (the first event carrying that UID)
/// - by day, under every day the event spans in the calendar's time zone
#[derive(Debug, Clone)]
pub struct Calendar {
    id: CalendarId,
    pub name: String,
    pub description: String,
    /// Where the document was loaded from; empty for in-memory text.
    pub url: String,
    /// Format version from the `VERSION` header, 0.0 when absent.
    pub version: f64,
    timezone: Tz,
    events: Vec<Event>,
    by_id: HashMap<String, usize>,
    by_imported_id: HashMap<String, usize>,
    by_day: BTreeMap<NaiveDate, Vec<usize>>,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::new()
    }
}

impl Calendar {
    /// Creates an empty calendar in UTC.
    pub fn new() -> Self {
        Self::with_id(CalendarId::new())
    }

    /// Creates an empty calendar with a known id.
    pub fn with_id(id: CalendarId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            url: String::new(),
            version: 0.0,
            timezone: Tz::UTC,
            events: Vec::new(),
            by_id: HashMap::new(),
            by_imported_id: HashMap::new(),
            by_day: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> CalendarId {
        self.id
    }

    /// The zone used to map events onto days.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Changes the calendar's time zone and rebuilds the day index.
    pub fn set_timezone(&mut self, tz: Tz) {
        if tz == self.timezone {
            return;
        }
        self.timezone = tz;
        self.by_day.clear();
        for (idx, event) in self.events.iter().enumerate() {
            for day in event.day_span(&tz).days() {
                self.by_day.entry(day).or_default().push(idx);
            }
        }
    }

    /// Adds an event to the calendar and all indexes.
    ///
    /// The event's `calendar` is set to this calendar. Returns `false` and
    /// leaves the calendar untouched if an event with the same stable id is
    /// already present.
    pub fn commit_event(&mut self, mut event: Event) -> bool {
        if self.by_id.contains_key(&event.id) {
            debug!(id = %event.id, uid = %event.imported_id, "Skipping duplicate event");
            return false;
        }

        event.calendar = self.id;
        let idx = self.events.len();
        let span = event.day_span(&self.timezone);
        trace!(
            id = %event.id,
            first = %span.first(),
            days = span.len(),
            "Committing event"
        );

        self.by_id.insert(event.id.clone(), idx);
        if !event.imported_id.is_empty() {
            self.by_imported_id
                .entry(event.imported_id.clone())
                .or_insert(idx);
        }
        for day in span.days() {
            self.by_day.entry(day).or_default().push(idx);
        }
        self.events.push(event);
        true
    }

    /// Looks up an event by its stable id.
    pub fn event_by_id(&self, id: &str) -> LookupResult<&Event> {
        self.by_id
            .get(id)
            .map(|&idx| &self.events[idx])
            .ok_or_else(|| LookupError::EventNotFound(id.to_string()))
    }

    /// Looks up an event by the UID it had in the source document.
    ///
    /// For recurring events this is the base event, not an occurrence.
    pub fn event_by_imported_id(&self, imported_id: &str) -> LookupResult<&Event> {
        self.by_imported_id
            .get(imported_id)
            .map(|&idx| &self.events[idx])
            .ok_or_else(|| LookupError::ImportedEventNotFound(imported_id.to_string()))
    }

    /// All events spanning `date`, in commit order.
    pub fn events_on_day(&self, date: NaiveDate) -> LookupResult<Vec<&Event>> {
        match self.by_day.get(&date) {
            Some(indexes) if !indexes.is_empty() => {
                Ok(indexes.iter().map(|&idx| &self.events[idx]).collect())
            }
            _ => Err(LookupError::NoEventsOnDay(date)),
        }
    }

    /// All events spanning the calendar day that contains `instant`.
    pub fn events_on(&self, instant: DateTime<Utc>) -> LookupResult<Vec<&Event>> {
        self.events_on_day(instant.with_timezone(&self.timezone).date_naive())
    }

    /// Up to `n` events starting after the current time, earliest first.
    pub fn upcoming(&self, n: usize) -> Vec<&Event> {
        self.upcoming_after(Utc::now(), n)
    }

    /// Up to `n` events starting strictly after `now`, earliest first.
    ///
    /// Events with equal start keep their commit order.
    pub fn upcoming_after(&self, now: DateTime<Utc>, n: usize) -> Vec<&Event> {
        let mut upcoming: Vec<&Event> = self.events.iter().filter(|e| e.start > now).collect();
        upcoming.sort_by_key(|e| e.start);
        upcoming.truncate(n);
        upcoming
    }

    /// Events in commit order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The day index as a map from date to the events spanning it.
    pub fn events_by_day(&self) -> BTreeMap<NaiveDate, Vec<&Event>> {
        self.by_day
            .iter()
            .map(|(day, indexes)| (*day, indexes.iter().map(|&idx| &self.events[idx]).collect()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::DaySpan;
    use chrono::{Duration, TimeZone};

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(cal: &Calendar, start: DateTime<Utc>, end: DateTime<Utc>, summary: &str) -> Event {
        Event::new(cal.id()).with_times(start, end).with_summary(summary)
    }

    #[test]
    fn commit_indexes_by_id_and_imported_id() {
        let mut cal = Calendar::new();
        let e = event(&cal, utc(2014, 7, 14, 10), utc(2014, 7, 14, 11), "Weekly")
            .with_imported_id("btb9tnpcnd4ng9rn31rdo0irn8@google.com");
        let id = e.id.clone();

        assert!(cal.commit_event(e));
        assert_eq!(cal.len(), 1);
        assert_eq!(cal.event_by_id(&id).unwrap().summary, "Weekly");
        assert_eq!(
            cal.event_by_imported_id("btb9tnpcnd4ng9rn31rdo0irn8@google.com")
                .unwrap()
                .id,
            id
        );
        assert_eq!(cal.events()[0].calendar, cal.id());
    }

    #[test]
    fn lookups_report_not_found() {
        let cal = Calendar::new();
        assert_eq!(
            cal.event_by_id("nope").unwrap_err(),
            LookupError::EventNotFound("nope".into())
        );
        assert!(matches!(
            cal.event_by_imported_id("nope"),
            Err(LookupError::ImportedEventNotFound(_))
        ));
        assert_eq!(
            cal.events_on_day(date(2025, 1, 1)).unwrap_err(),
            LookupError::NoEventsOnDay(date(2025, 1, 1))
        );
    }

    #[test]
    fn duplicate_ids_are_skipped() {
        let mut cal = Calendar::new();
        let e = event(&cal, utc(2025, 2, 5, 10), utc(2025, 2, 5, 11), "Standup");
        assert!(cal.commit_event(e.clone()));
        assert!(!cal.commit_event(e));
        assert_eq!(cal.len(), 1);
        assert_eq!(cal.events_on_day(date(2025, 2, 5)).unwrap().len(), 1);
    }

    #[test]
    fn imported_id_keeps_first_event() {
        let mut cal = Calendar::new();
        let base = event(&cal, utc(2025, 2, 5, 10), utc(2025, 2, 5, 11), "Standup")
            .with_imported_id("uid-1");
        let next = base.occurrence(utc(2025, 2, 6, 10), utc(2025, 2, 6, 11), 1);
        cal.commit_event(base.clone());
        cal.commit_event(next);
        assert_eq!(cal.event_by_imported_id("uid-1").unwrap().id, base.id);
    }

    mod by_day {
        use super::*;

        #[test]
        fn multi_day_event_is_on_every_day() {
            let mut cal = Calendar::new();
            cal.commit_event(event(&cal, utc(2016, 9, 1, 9), utc(2016, 10, 1, 17), "Conference"));

            for day in DaySpan::of(utc(2016, 9, 1, 0), utc(2016, 10, 1, 1), &Utc).days() {
                assert!(cal.events_on_day(day).is_ok(), "missing on {day}");
            }
            assert!(cal.events_on_day(date(2016, 8, 31)).is_err());
            assert!(cal.events_on_day(date(2016, 10, 2)).is_err());
            assert!(cal.events_on_day(date(2016, 11, 1)).is_err());
        }

        #[test]
        fn events_keep_commit_order() {
            let mut cal = Calendar::new();
            cal.commit_event(event(&cal, utc(2025, 2, 5, 15), utc(2025, 2, 5, 16), "late"));
            cal.commit_event(event(&cal, utc(2025, 2, 5, 9), utc(2025, 2, 5, 10), "early"));
            let summaries: Vec<_> = cal
                .events_on_day(date(2025, 2, 5))
                .unwrap()
                .iter()
                .map(|e| e.summary.as_str())
                .collect();
            assert_eq!(summaries, vec!["late", "early"]);
        }

        #[test]
        fn events_on_uses_calendar_timezone() {
            let mut cal = Calendar::new();
            cal.set_timezone(Tz::Europe__Sofia);
            let start = utc(2025, 1, 14, 23);
            cal.commit_event(event(&cal, start, start + Duration::minutes(30), "late"));

            assert!(cal.events_on_day(date(2025, 1, 15)).is_ok());
            assert!(cal.events_on_day(date(2025, 1, 14)).is_err());
            assert!(cal.events_on(utc(2025, 1, 15, 12)).is_ok());
        }

        #[test]
        fn set_timezone_reindexes() {
            let mut cal = Calendar::new();
            let start = utc(2025, 1, 14, 23);
            cal.commit_event(event(&cal, start, start + Duration::minutes(30), "late"));
            assert!(cal.events_on_day(date(2025, 1, 14)).is_ok());

            cal.set_timezone(Tz::Europe__Sofia);
            assert!(cal.events_on_day(date(2025, 1, 14)).is_err());
            assert!(cal.events_on_day(date(2025, 1, 15)).is_ok());
            assert_eq!(cal.events_by_day().len(), 1);
        }

        fn all_day(cal: &Calendar, first: NaiveDate, days: u64) -> Event {
            let start = Utc.from_utc_datetime(&first.and_time(chrono::NaiveTime::MIN));
            let mut e = event(cal, start, start + Duration::days(days as i64), "Holiday");
            e.whole_day = true;
            e
        }

        #[test]
        fn whole_day_keeps_its_dates_west_of_utc() {
            let mut cal = Calendar::new();
            cal.set_timezone(Tz::America__New_York);
            cal.commit_event(all_day(&cal, date(2025, 1, 10), 1));

            assert!(cal.events_on_day(date(2025, 1, 9)).is_err());
            assert!(cal.events_on_day(date(2025, 1, 10)).is_ok());
            assert!(cal.events_on_day(date(2025, 1, 11)).is_err());
        }

        #[test]
        fn whole_day_survives_reindexing() {
            let mut cal = Calendar::new();
            cal.commit_event(all_day(&cal, date(2025, 1, 10), 2));
            cal.set_timezone(Tz::Pacific__Honolulu);

            let days: Vec<_> = cal.events_by_day().into_keys().collect();
            assert_eq!(days, vec![date(2025, 1, 10), date(2025, 1, 11)]);
        }
    }

    mod upcoming {
        use super::*;

        #[test]
        fn returns_future_events_sorted() {
            let mut cal = Calendar::new();
            let now = utc(2025, 2, 5, 12);
            cal.commit_event(event(&cal, utc(2025, 2, 7, 9), utc(2025, 2, 7, 10), "third"));
            cal.commit_event(event(&cal, utc(2025, 2, 4, 9), utc(2025, 2, 4, 10), "past"));
            cal.commit_event(event(&cal, utc(2025, 2, 5, 13), utc(2025, 2, 5, 14), "first"));
            cal.commit_event(event(&cal, utc(2025, 2, 6, 9), utc(2025, 2, 6, 10), "second"));

            let summaries: Vec<_> = cal
                .upcoming_after(now, 10)
                .iter()
                .map(|e| e.summary.as_str())
                .collect();
            assert_eq!(summaries, vec!["first", "second", "third"]);
            assert_eq!(cal.upcoming_after(now, 2).len(), 2);
            assert!(cal.upcoming_after(now, 0).is_empty());
        }

        #[test]
        fn start_equal_to_now_is_excluded() {
            let mut cal = Calendar::new();
            let now = utc(2025, 2, 5, 12);
            cal.commit_event(event(&cal, now, now + Duration::hours(1), "now"));
            assert!(cal.upcoming_after(now, 5).is_empty());
        }

        #[test]
        fn ties_keep_commit_order() {
            let mut cal = Calendar::new();
            let start = utc(2025, 2, 6, 9);
            cal.commit_event(event(&cal, start, start + Duration::hours(1), "a"));
            cal.commit_event(event(&cal, start, start + Duration::hours(1), "b"));
            let summaries: Vec<_> = cal
                .upcoming_after(utc(2025, 2, 5, 0), 5)
                .iter()
                .map(|e| e.summary.as_str())
                .collect();
            assert_eq!(summaries, vec!["a", "b"]);
        }
    }
}
