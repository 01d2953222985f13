//! ICS feed parsing.
//!
//! This module turns RFC 5545 calendar text into normalized [`Event`]s,
//! expanding recurring definitions within a bounded horizon.

mod parse;
mod recurrence;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::event::Event;

pub use parse::parse_feed;

/// Result of parsing one feed.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    /// Events in parse order. Expanded occurrences follow their master's position.
    pub events: Vec<Event>,
    /// Number of VEVENTs that could not be turned into events.
    pub skipped: usize,
    /// Value of `X-WR-CALNAME`, if the feed names itself.
    pub calendar_name: Option<String>,
}

/// A date or date-time as written in the feed, before normalization.
#[derive(Debug, Clone, PartialEq)]
enum IcsTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl IcsTime {
    /// Resolve to an instant. Floating times and unknown zones are read as UTC.
    fn to_utc(&self) -> DateTime<Utc> {
        match self {
            IcsTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            IcsTime::DateTimeUtc(dt) => *dt,
            IcsTime::DateTimeFloating(dt) => dt.and_utc(),
            IcsTime::DateTimeZoned { datetime, tzid } => match resolve_tz(tzid) {
                Some(tz) => tz
                    .from_local_datetime(datetime)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| datetime.and_utc()),
                None => datetime.and_utc(),
            },
        }
    }

    fn is_date(&self) -> bool {
        matches!(self, IcsTime::Date(_))
    }
}

fn resolve_tz(tzid: &str) -> Option<Tz> {
    tzid.trim_matches('"').parse::<Tz>().ok()
}
