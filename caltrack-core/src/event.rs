//! Normalized event records.
//!
//! Every feed, whatever its original time zone handling, ends up as a list of
//! [`Event`] values with UTC instants. Display and day splitting go through a
//! [`TimeMode`](crate::time_mode::TimeMode) afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a calendar source.
///
/// Derived from the source URL so the same feed maps to the same cache file
/// across sessions, whatever display name it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarId(Uuid);

impl CalendarId {
    pub fn from_url(url: &str) -> Self {
        CalendarId(Uuid::new_v5(&Uuid::NAMESPACE_URL, url.trim().as_bytes()))
    }
}

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CalendarId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(CalendarId)
    }
}

/// One calendar occurrence.
///
/// Recurring definitions are expanded before they become events, so every
/// value here is a concrete interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub uid: String,
    pub calendar_id: CalendarId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Event {
    /// Length of the event. Never negative.
    pub fn duration(&self) -> TimeDelta {
        (self.end - self.start).max(TimeDelta::zero())
    }

    pub fn duration_hours(&self) -> f64 {
        hours(self.duration())
    }

    /// Whether the event starts at or after `boundary`.
    pub fn starts_at_or_after(&self, boundary: DateTime<Utc>) -> bool {
        self.start >= boundary
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

/// Fractional hours of a duration.
pub fn hours(delta: TimeDelta) -> f64 {
    delta.num_seconds() as f64 / 3600.0
}
