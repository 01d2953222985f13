//! Time-zone normalization modes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Wall clock used to place events on days.
///
/// Events are stored as UTC instants; the mode only decides which calendar
/// day a moment belongs to and how it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeMode {
    /// The machine's local zone.
    #[default]
    Local,
    Utc,
    /// Zone information stripped; the stored UTC wall clock is kept.
    Naive,
    /// A fixed IANA zone, e.g. `Europe/Zurich`.
    Zone(Tz),
}

impl TimeMode {
    /// Wall clock reading of `instant` in this mode.
    pub fn wall_clock(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            TimeMode::Local => instant.with_timezone(&Local).naive_local(),
            TimeMode::Utc | TimeMode::Naive => instant.naive_utc(),
            TimeMode::Zone(tz) => instant.with_timezone(tz).naive_local(),
        }
    }

    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.wall_clock(instant).date()
    }

    /// The instant at which `day` begins in this mode.
    pub fn day_start(&self, day: NaiveDate) -> DateTime<Utc> {
        match self {
            TimeMode::Local => midnight_in(&Local, day),
            TimeMode::Utc | TimeMode::Naive => day.and_time(NaiveTime::MIN).and_utc(),
            TimeMode::Zone(tz) => midnight_in(tz, day),
        }
    }
}

/// First existing instant of `day` in `tz`.
///
/// Some zones skip local midnight on DST changes, so the following hours are
/// tried before falling back to UTC midnight.
fn midnight_in<Z: TimeZone>(tz: &Z, day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|h| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

impl FromStr for TimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(TimeMode::Local),
            "utc" => Ok(TimeMode::Utc),
            "naive" => Ok(TimeMode::Naive),
            _ => s
                .trim()
                .parse::<Tz>()
                .map(TimeMode::Zone)
                .map_err(|_| format!("Unknown time mode '{s}'. Expected local, utc, naive or an IANA zone")),
        }
    }
}

impl TryFrom<String> for TimeMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeMode> for String {
    fn from(mode: TimeMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for TimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeMode::Local => write!(f, "local"),
            TimeMode::Utc => write!(f, "utc"),
            TimeMode::Naive => write!(f, "naive"),
            TimeMode::Zone(tz) => write!(f, "{}", tz.name()),
        }
    }
}
