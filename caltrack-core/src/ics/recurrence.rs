//! RRULE expansion for recurring events.
//!
//! Expands a master recurring definition into concrete occurrence intervals
//! inside a bounded range, respecting EXDATEs. Open-ended rules never expand
//! past the range end.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use super::{IcsTime, resolve_tz};
use crate::date_range::DateRange;
use crate::error::ParseError;

/// Number of equal slices a horizon is expanded in.
///
/// Every slice gets its own occurrence budget, so a busy series stays complete
/// around now instead of being cut off partway through the lookback.
const SLICES: i32 = 24;

/// Upper bound on occurrences generated per slice for a single series.
const MAX_PER_SLICE: u16 = 1000;

/// A recurring definition as read from a VEVENT.
pub(super) struct RecurringDefinition<'a> {
    pub uid: &'a str,
    pub start: &'a IcsTime,
    pub duration: Duration,
    pub rrule: &'a str,
    pub exdates: &'a [IcsTime],
}

/// One generated occurrence.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Format a time as an rrule-parsable value with its property parameters.
fn rrule_time(name: &str, time: &IcsTime) -> String {
    match time {
        // the rrule crate needs a datetime, so all-day dates become midnight UTC
        IcsTime::Date(d) => format!("{}:{}T000000Z", name, d.format("%Y%m%d")),
        IcsTime::DateTimeZoned { datetime, tzid } if resolve_tz(tzid).is_some() => format!(
            "{};TZID={}:{}",
            name,
            tzid.trim_matches('"'),
            datetime.format("%Y%m%dT%H%M%S")
        ),
        other => format!("{}:{}", name, other.to_utc().format("%Y%m%dT%H%M%SZ")),
    }
}

/// Build an iCalendar-format RRULE string for the rrule crate parser.
fn build_rrule_string(definition: &RecurringDefinition) -> String {
    let mut lines = vec![
        rrule_time("DTSTART", definition.start),
        format!("RRULE:{}", definition.rrule),
    ];

    for exdate in definition.exdates {
        // EXDATE must use the same value type as DTSTART
        let exdate = match (definition.start, exdate) {
            (IcsTime::Date(_), IcsTime::Date(_)) => exdate.clone(),
            (IcsTime::Date(_), other) => IcsTime::Date(other.to_utc().date_naive()),
            (_, other) => other.clone(),
        };
        lines.push(rrule_time("EXDATE", &exdate));
    }

    lines.join("\n")
}

/// Expand `definition` into occurrences whose start lies within `range`.
///
/// Occurrences whose end would overflow the calendar are dropped.
pub(super) fn expand(
    definition: &RecurringDefinition,
    range: &DateRange,
) -> Result<Vec<Occurrence>, ParseError> {
    let rrule_str = build_rrule_string(definition);

    let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| ParseError::Recurrence {
        uid: definition.uid.to_string(),
        reason: format!("{}", e),
    })?;

    let start = range.start_or_epoch();
    let end = range.end_or_far_future();
    let slice = ((end - start) / SLICES).max(Duration::days(1));

    let tz: rrule::Tz = Utc.into();
    let mut dates = Vec::new();
    let mut limited = false;
    let mut slice_start = start;

    loop {
        let slice_end = slice_start.checked_add_signed(slice).map_or(end, |e| e.min(end));

        // after/before are inclusive; only the last slice keeps `end` itself
        let before = if slice_end == end {
            end
        } else {
            slice_end - Duration::nanoseconds(1)
        };

        let result = rrule_set
            .clone()
            .after(slice_start.with_timezone(&tz))
            .before(before.with_timezone(&tz))
            .all(MAX_PER_SLICE);

        limited |= result.limited;
        dates.extend(result.dates);

        if slice_end >= end {
            break;
        }
        slice_start = slice_end;
    }

    if limited {
        log::warn!(
            "Recurring event '{}' hit the limit of {} occurrences in part of the horizon",
            definition.uid,
            MAX_PER_SLICE
        );
    }

    Ok(dates
        .iter()
        .filter_map(|occ| {
            let start = occ.with_timezone(&Utc);
            let end = start.checked_add_signed(definition.duration)?;
            Some(Occurrence { start, end })
        })
        .collect())
}
