//! Flat per-day rows for reporting.
//!
//! Each cached event is split into day fragments in the active time mode and
//! emitted as one row per day, so a row's `duration_hours` always belongs to
//! exactly one date.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::cache::CacheEntry;
use crate::date_range::DateRange;
use crate::source::{CalendarSource, normalize_calendar_name};
use crate::time_mode::TimeMode;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRow {
    pub date: NaiveDate,
    pub calendar: String,
    pub category: String,
    pub duration_hours: f64,
    pub uid: String,
    pub title: String,
}

/// Build rows for every day fragment falling inside `range`.
///
/// A calendar listed twice contributes its events once. Rows are ordered by
/// date, then calendar, then uid.
pub fn rows<'a>(
    calendars: impl IntoIterator<Item = (&'a CalendarSource, &'a CacheEntry)>,
    mode: TimeMode,
    range: &DateRange,
) -> Vec<EventRow> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (source, entry) in calendars {
        let calendar = normalize_calendar_name(&source.name);

        for event in &entry.events {
            for fragment in event.day_fragments(mode) {
                if !range.contains_day(fragment.day) {
                    continue;
                }
                if !seen.insert((event.calendar_id, fragment.uid.clone(), fragment.day)) {
                    continue;
                }

                rows.push(EventRow {
                    date: fragment.day,
                    calendar: calendar.to_string(),
                    category: event
                        .category
                        .as_deref()
                        .unwrap_or_else(|| source.category())
                        .to_string(),
                    duration_hours: fragment.duration_hours(),
                    uid: fragment.uid,
                    title: event.title.clone(),
                });
            }
        }
    }

    rows.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| a.calendar.cmp(&b.calendar))
            .then_with(|| a.uid.cmp(&b.uid))
    });
    rows
}

/// Column to total hours by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Calendar,
    Category,
    Day,
}

/// Total hours per group, ordered by group key.
pub fn totals(rows: &[EventRow], by: GroupBy) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<String, f64> = BTreeMap::new();

    for row in rows {
        let key = match by {
            GroupBy::Calendar => row.calendar.clone(),
            GroupBy::Category => row.category.clone(),
            GroupBy::Day => row.date.to_string(),
        };
        *sums.entry(key).or_default() += row.duration_hours;
    }

    sums.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn source() -> CalendarSource {
        let mut source = CalendarSource::new("https://example.com/work.ics", "[Imported] Work");
        source.category = Some("Job".to_string());
        source
    }

    fn event(uid: &str, start: DateTime<Utc>, hours: i64) -> Event {
        Event {
            uid: uid.to_string(),
            calendar_id: source().id(),
            start,
            end: start + Duration::hours(hours),
            title: format!("Event {uid}"),
            category: None,
        }
    }

    fn range(from: u32, to: u32) -> DateRange {
        DateRange {
            from: Some(utc(from, 0)),
            to: Some(utc(to, 23)),
        }
    }

    #[test]
    fn test_rows_split_overnight_events() {
        let source = source();
        let entry = CacheEntry::new(vec![event("late", utc(4, 22), 4)], None);

        let rows = rows([(&source, &entry)], TimeMode::Utc, &range(1, 31));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(rows[0].duration_hours, 2.0);
        assert_eq!(rows[1].duration_hours, 2.0);
        assert_eq!(rows[0].calendar, "Work");
        assert_eq!(rows[0].category, "Job");
    }

    #[test]
    fn test_rows_are_filtered_by_day() {
        let source = source();
        let entry = CacheEntry::new(
            vec![event("a", utc(1, 9), 1), event("b", utc(5, 9), 1), event("c", utc(9, 23), 2)],
            None,
        );

        let rows = rows([(&source, &entry)], TimeMode::Utc, &range(5, 9));
        let uids: Vec<_> = rows.iter().map(|r| r.uid.as_str()).collect();

        // "c" runs into the 10th, only its first hour is in range
        assert_eq!(uids, vec!["b", "c"]);
        assert_eq!(rows[1].duration_hours, 1.0);
    }

    #[test]
    fn test_same_calendar_twice_counts_once() {
        let source = source();
        let entry = CacheEntry::new(vec![event("a", utc(2, 9), 1)], None);

        let rows = rows([(&source, &entry), (&source, &entry)], TimeMode::Utc, &range(1, 31));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_totals_by_group() {
        let source = source();
        let entry = CacheEntry::new(
            vec![event("a", utc(2, 9), 1), event("b", utc(2, 13), 2), event("c", utc(3, 9), 3)],
            None,
        );
        let rows = rows([(&source, &entry)], TimeMode::Utc, &range(1, 31));

        assert_eq!(totals(&rows, GroupBy::Calendar), vec![("Work".to_string(), 6.0)]);
        assert_eq!(
            totals(&rows, GroupBy::Day),
            vec![("2024-03-02".to_string(), 3.0), ("2024-03-03".to_string(), 3.0)]
        );
    }
}
