//! Recurrence rules and their expansion into occurrence events.
//!
//! Supported rule parts: `FREQ`, `INTERVAL`, `COUNT`, `UNTIL`, `BYMONTH`
//! and `BYDAY`. Ordinal `BYDAY` prefixes (`1MO`, `-1FR`) are accepted but
//! the ordinal is ignored. Exceptions (`EXDATE`, `RECURRENCE-ID`) are not
//! applied.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, Months, NaiveDateTime, Utc};
use chrono_tz::Tz;
use icalfeed_core::{Event, local_to_utc, resolve_timezone};
use regex::Regex;
use tracing::{debug, warn};

use crate::extract::{extract, parse_date_or_time, parse_integer, weekday_code};

/// Upper bound on cursor steps for one rule, for rules whose filters
/// never match (e.g. `BYMONTH=13`).
const MAX_CURSOR_STEPS: u32 = 10_000;

static FREQ_RE: LazyLock<Regex> = LazyLock::new(|| rule_part("FREQ"));
static INTERVAL_RE: LazyLock<Regex> = LazyLock::new(|| rule_part("INTERVAL"));
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| rule_part("COUNT"));
static UNTIL_RE: LazyLock<Regex> = LazyLock::new(|| rule_part("UNTIL"));
static BYMONTH_RE: LazyLock<Regex> = LazyLock::new(|| rule_part("BYMONTH"));
static BYDAY_RE: LazyLock<Regex> = LazyLock::new(|| rule_part("BYDAY"));

fn rule_part(name: &str) -> Regex {
    Regex::new(&format!(r"(?i)(?:^|;)\s*{name}=([^;]*)")).expect("rule part regex is valid")
}

/// How far the cursor advances per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "WEEKLY" => Ok(Self::Weekly),
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(format!("unsupported frequency {other:?}")),
        }
    }
}

impl Frequency {
    /// The local time `steps` frequency units after `base`.
    ///
    /// Month arithmetic is anchored on `base`, so a rule starting on the
    /// 31st lands on the last day of shorter months without drifting.
    fn advance(self, base: NaiveDateTime, steps: u32) -> Option<NaiveDateTime> {
        match self {
            Self::Daily => base.checked_add_days(Days::new(u64::from(steps))),
            Self::Weekly => base.checked_add_days(Days::new(7 * u64::from(steps))),
            Self::Monthly => base.checked_add_months(Months::new(steps)),
            Self::Yearly => base.checked_add_months(Months::new(steps.checked_mul(12)?)),
        }
    }
}

/// A parsed `RRULE` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    /// `None` when `FREQ` is missing or unsupported.
    pub frequency: Option<Frequency>,
    /// Steps per advance, at least 1.
    pub interval: u32,
    /// Maximum occurrences, `0` when unset.
    pub count: u32,
    pub until: Option<DateTime<Utc>>,
    /// Months (1-12) the cursor must fall in; empty means any.
    pub by_month: Vec<u32>,
    /// Two-letter weekday codes; empty means "on the cursor day".
    pub by_day: Vec<String>,
}

impl RecurrenceRule {
    /// Parses a rule such as `FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE;COUNT=6`.
    ///
    /// Unknown parts are ignored; malformed numbers default as usual.
    pub fn parse(rule: &str) -> Self {
        let freq = extract(&FREQ_RE, rule);
        let frequency = freq.parse::<Frequency>().ok();
        if frequency.is_none() {
            debug!(freq = %freq, "Unsupported recurrence frequency");
        }

        let until = extract(&UNTIL_RE, rule);
        let until = match until.trim() {
            "" => None,
            value => {
                let parsed = parse_date_or_time(value, None);
                if parsed.is_none() {
                    debug!(until = %value, "Invalid UNTIL, ignoring");
                }
                parsed
            }
        };

        let by_month = extract(&BYMONTH_RE, rule)
            .split(',')
            .filter_map(|m| m.trim().parse::<u32>().ok())
            .filter(|m| (1..=12).contains(m))
            .collect();

        let by_day = extract(&BYDAY_RE, rule)
            .split(',')
            .map(|d| {
                d.trim()
                    .trim_start_matches(|c: char| c == '+' || c == '-' || c.is_ascii_digit())
                    .to_ascii_uppercase()
            })
            .filter(|d| !d.is_empty())
            .collect();

        Self {
            frequency,
            interval: parse_integer(&extract(&INTERVAL_RE, rule)).max(1),
            count: parse_integer(&extract(&COUNT_RE, rule)),
            until,
            by_month,
            by_day,
        }
    }

    fn allows_month(&self, month: u32) -> bool {
        self.by_month.is_empty() || self.by_month.contains(&month)
    }

    fn allows_weekday(&self, code: &str) -> bool {
        !code.is_empty() && self.by_day.iter().any(|d| d == code)
    }

    fn allows_instant(&self, instant: DateTime<Utc>) -> bool {
        self.until.is_none_or(|until| instant <= until)
    }
}

/// Controls how far a rule is expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Maximum occurrences emitted per recurring event, `COUNT` permitting.
    pub max_repeats: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self { max_repeats: 10 }
    }
}

/// Expands a recurring event into its additional occurrences.
///
/// The base event itself is never part of the result. Occurrences keep the
/// base duration, get a fresh stable id and carry their 1-based emission
/// ordinal as `sequence`. The cursor walks in the event's `TZID` zone (UTC
/// when unresolvable) so wall-clock times survive DST changes.
///
/// Expansion stops when `max_repeats` or `COUNT` occurrences have been
/// emitted, or once the cursor passes `UNTIL`.
pub fn expand(event: &Event, options: &ExpandOptions) -> Vec<Event> {
    let rule = RecurrenceRule::parse(&event.rrule);
    let Some(frequency) = rule.frequency else {
        warn!(uid = %event.imported_id, rrule = %event.rrule, "Cannot expand recurrence rule");
        return Vec::new();
    };

    let limit = match rule.count as usize {
        0 => options.max_repeats,
        count => count.min(options.max_repeats),
    };
    if limit == 0 {
        return Vec::new();
    }

    let tz = resolve_timezone(&event.start_tzid).unwrap_or(Tz::UTC);
    let base = event.start.with_timezone(&tz).naive_local();
    let duration = event.duration();

    let mut occurrences = Vec::new();
    let mut last = event.start;

    'steps: for step in 0..MAX_CURSOR_STEPS {
        let Some(cursor_local) = rule
            .interval
            .checked_mul(step)
            .and_then(|steps| frequency.advance(base, steps))
        else {
            break;
        };
        let cursor = local_to_utc(cursor_local, &tz);
        if !rule.allows_instant(cursor) {
            break;
        }
        if !rule.allows_month(cursor_local.month()) {
            continue;
        }

        if rule.by_day.is_empty() {
            if cursor > last {
                last = cursor;
                push_occurrence(event, &mut occurrences, cursor, duration);
                if occurrences.len() >= limit {
                    break;
                }
            }
            continue;
        }

        for offset in 0..7 {
            let Some(day_local) = cursor_local.checked_add_days(Days::new(offset)) else {
                break 'steps;
            };
            let day = local_to_utc(day_local, &tz);
            if day <= last
                || !rule.allows_instant(day)
                || !rule.allows_weekday(weekday_code(&day_local.weekday().to_string()))
            {
                continue;
            }
            last = day;
            push_occurrence(event, &mut occurrences, day, duration);
            if occurrences.len() >= limit {
                break 'steps;
            }
        }
    }

    debug!(
        uid = %event.imported_id,
        rrule = %event.rrule,
        occurrences = occurrences.len(),
        "Expanded recurring event"
    );
    occurrences
}

fn push_occurrence(
    event: &Event,
    occurrences: &mut Vec<Event>,
    start: DateTime<Utc>,
    duration: Duration,
) {
    let sequence = occurrences.len() as u32 + 1;
    let end = start.checked_add_signed(duration).unwrap_or(start);
    occurrences.push(event.occurrence(start, end, sequence));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};
    use icalfeed_core::CalendarId;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn recurring(start: DateTime<Utc>, rrule: &str) -> Event {
        Event::new(CalendarId::new())
            .with_times(start, start + Duration::hours(1))
            .with_imported_id("standup@example.com")
            .with_rrule(rrule)
    }

    fn starts(events: &[Event]) -> Vec<DateTime<Utc>> {
        events.iter().map(|e| e.start).collect()
    }

    mod rule {
        use super::*;

        #[test]
        fn parses_all_parts() {
            let rule = RecurrenceRule::parse(
                "FREQ=WEEKLY;INTERVAL=2;COUNT=6;UNTIL=20250301T000000Z;BYMONTH=1,2;BYDAY=MO,1WE,-1FR",
            );
            assert_eq!(rule.frequency, Some(Frequency::Weekly));
            assert_eq!(rule.interval, 2);
            assert_eq!(rule.count, 6);
            assert_eq!(rule.until, Some(utc(2025, 3, 1, 0)));
            assert_eq!(rule.by_month, vec![1, 2]);
            assert_eq!(rule.by_day, vec!["MO", "WE", "FR"]);
        }

        #[test]
        fn defaults() {
            let rule = RecurrenceRule::parse("FREQ=DAILY");
            assert_eq!(rule.interval, 1);
            assert_eq!(rule.count, 0);
            assert!(rule.until.is_none());
            assert!(rule.by_month.is_empty());
            assert!(rule.by_day.is_empty());

            assert_eq!(RecurrenceRule::parse("FREQ=DAILY;INTERVAL=0").interval, 1);
        }

        #[test]
        fn unknown_frequency() {
            assert_eq!(RecurrenceRule::parse("FREQ=HOURLY").frequency, None);
            assert_eq!(RecurrenceRule::parse("COUNT=3").frequency, None);
        }

        #[test]
        fn date_only_until() {
            let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20250110");
            assert_eq!(rule.until, Some(utc(2025, 1, 10, 0)));
        }

        #[test]
        fn invalid_months_are_dropped() {
            let rule = RecurrenceRule::parse("FREQ=YEARLY;BYMONTH=0,3,13,x");
            assert_eq!(rule.by_month, vec![3]);
        }
    }

    #[test]
    fn daily_count_three() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY;COUNT=3");
        let occurrences = expand(&base, &ExpandOptions::default());

        assert_eq!(
            starts(&occurrences),
            vec![utc(2025, 1, 7, 9), utc(2025, 1, 8, 9), utc(2025, 1, 9, 9)]
        );
        let sequences: Vec<_> = occurrences.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        for occurrence in &occurrences {
            assert_eq!(occurrence.duration(), Duration::hours(1));
            assert_ne!(occurrence.id, base.id);
            assert_eq!(occurrence.imported_id, base.imported_id);
        }
    }

    #[test]
    fn no_count_uses_max_repeats() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY");
        assert_eq!(expand(&base, &ExpandOptions::default()).len(), 10);
        assert_eq!(expand(&base, &ExpandOptions { max_repeats: 4 }).len(), 4);
        assert!(expand(&base, &ExpandOptions { max_repeats: 0 }).is_empty());
    }

    #[test]
    fn count_is_capped_by_max_repeats() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY;COUNT=50");
        assert_eq!(expand(&base, &ExpandOptions { max_repeats: 5 }).len(), 5);
    }

    #[test]
    fn until_before_second_occurrence() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY;UNTIL=20250106T120000Z");
        assert!(expand(&base, &ExpandOptions::default()).is_empty());
    }

    #[test]
    fn until_is_inclusive() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY;UNTIL=20250108T090000Z");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 1, 7, 9), utc(2025, 1, 8, 9)]
        );
    }

    #[test]
    fn interval_applies_to_daily_and_weekly() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY;INTERVAL=3;COUNT=2");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 1, 9, 9), utc(2025, 1, 12, 9)]
        );

        let base = recurring(utc(2025, 1, 6, 9), "FREQ=WEEKLY;INTERVAL=2;COUNT=2");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 1, 20, 9), utc(2025, 2, 3, 9)]
        );
    }

    #[test]
    fn monthly_from_month_end_does_not_drift() {
        let base = recurring(utc(2025, 1, 31, 9), "FREQ=MONTHLY;COUNT=3");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 2, 28, 9), utc(2025, 3, 31, 9), utc(2025, 4, 30, 9)]
        );
    }

    #[test]
    fn yearly_with_by_month() {
        let base = recurring(utc(2024, 3, 10, 9), "FREQ=MONTHLY;BYMONTH=3,6;COUNT=3");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2024, 6, 10, 9), utc(2025, 3, 10, 9), utc(2025, 6, 10, 9)]
        );

        let base = recurring(utc(2024, 3, 10, 9), "FREQ=YEARLY;COUNT=2");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 3, 10, 9), utc(2026, 3, 10, 9)]
        );
    }

    #[test]
    fn weekly_by_day() {
        // Monday 2025-01-06
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=WEEKLY;BYDAY=MO,WE,SA;COUNT=4");
        let occurrences = expand(&base, &ExpandOptions::default());
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2025, 1, 8, 9),
                utc(2025, 1, 11, 9),
                utc(2025, 1, 13, 9),
                utc(2025, 1, 15, 9)
            ]
        );
        assert_eq!(occurrences[1].start.weekday(), Weekday::Sat);
    }

    #[test]
    fn daily_by_day_has_no_duplicates() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=DAILY;BYDAY=FR;COUNT=3");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 1, 10, 9), utc(2025, 1, 17, 9), utc(2025, 1, 24, 9)]
        );
    }

    #[test]
    fn by_day_respects_until() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=WEEKLY;BYDAY=TU,TH;UNTIL=20250110T000000Z");
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 1, 7, 9), utc(2025, 1, 9, 9)]
        );
    }

    #[test]
    fn unsupported_frequency_yields_nothing() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=HOURLY;COUNT=3");
        assert!(expand(&base, &ExpandOptions::default()).is_empty());
    }

    #[test]
    fn unmatched_by_month_terminates() {
        let base = recurring(utc(2025, 1, 6, 9), "FREQ=YEARLY;BYMONTH=2");
        assert!(expand(&base, &ExpandOptions::default()).is_empty());
    }

    #[test]
    fn wall_clock_kept_across_dst() {
        // 09:00 Berlin is 08:00 UTC in winter and 07:00 UTC in summer
        let mut base = recurring(utc(2025, 3, 28, 8), "FREQ=DAILY;COUNT=3");
        base.start_tzid = "Europe/Berlin".into();
        assert_eq!(
            starts(&expand(&base, &ExpandOptions::default())),
            vec![utc(2025, 3, 29, 8), utc(2025, 3, 30, 7), utc(2025, 3, 31, 7)]
        );
    }
}
