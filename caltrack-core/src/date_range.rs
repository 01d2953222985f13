//! Date range for bounding recurrence expansion and filtering events.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Number of days covered by a report when no range is given.
pub const DEFAULT_REPORT_DAYS: i64 = 365;

/// Date range for filtering events.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Default for DateRange {
    /// Default range: the last DEFAULT_REPORT_DAYS up to now
    fn default() -> Self {
        let now = Utc::now();
        DateRange {
            from: Some(now - Duration::days(DEFAULT_REPORT_DAYS)),
            to: Some(now),
        }
    }
}

impl DateRange {
    /// Range reaching `lookback` into the past and `lookahead` into the future.
    /// A side that overflows the calendar is left unbounded.
    pub fn around(now: DateTime<Utc>, lookback: Duration, lookahead: Duration) -> Self {
        DateRange {
            from: now.checked_sub_signed(lookback),
            to: now.checked_add_signed(lookahead),
        }
    }

    /// Parse a date string into a DateRange.
    /// - `from`: "start" for unbounded, or YYYY-MM-DD
    /// - `to`: YYYY-MM-DD, defaults to now if not specified
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        let default = DateRange::default();

        let from_dt = match from {
            Some("start") => None, // Unbounded past
            Some(s) => Some(parse_date_start(s)?),
            None => default.from,
        };

        let to_dt = match to {
            Some(s) => Some(parse_date_end(s)?),
            None => default.to,
        };

        if let (Some(f), Some(t)) = (from_dt, to_dt) {
            if f > t {
                return Err("Start must be before end".to_string());
            }
        }

        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    /// Lower bound, using the epoch if unbounded.
    pub fn start_or_epoch(&self) -> DateTime<Utc> {
        self.from.unwrap_or_else(|| midnight_utc(1970, 1, 1))
    }

    /// Upper bound, using a far future date if unbounded.
    pub fn end_or_far_future(&self) -> DateTime<Utc> {
        self.to.unwrap_or_else(|| midnight_utc(2100, 1, 1))
    }

    /// Whether `day` lies within the range, comparing calendar dates only.
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.from.is_none_or(|f| day >= f.date_naive()) && self.to.is_none_or(|t| day <= t.date_naive())
    }
}

fn midnight_utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse YYYY-MM-DD as start of day in UTC
fn parse_date_start(s: &str) -> Result<DateTime<Utc>, String> {
    let date = parse_date(s)?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Parse YYYY-MM-DD as end of day in UTC
fn parse_date_end(s: &str) -> Result<DateTime<Utc>, String> {
    let date = parse_date(s)?;
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("Invalid date '{}'", s))
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}
