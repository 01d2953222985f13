//! Per-day splitting of events.
//!
//! An event that runs past midnight contributes its time to every day it
//! touches, proportionally. Fragments keep the parent uid so aggregations can
//! still tell which event they came from; the day is the second key.

use chrono::{NaiveDate, TimeDelta};

use crate::event::{Event, hours};
use crate::time_mode::TimeMode;

/// The part of one event that falls on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayFragment {
    pub uid: String,
    pub day: NaiveDate,
    pub duration: TimeDelta,
}

impl DayFragment {
    pub fn duration_hours(&self) -> f64 {
        hours(self.duration)
    }
}

/// Split `event` into one fragment per day it overlaps in `mode`.
///
/// Fragments partition the event exactly, so their durations sum to
/// [`Event::duration`]. A zero-length event yields a single empty fragment on
/// its start day.
pub fn day_fragments(event: &Event, mode: TimeMode) -> Vec<DayFragment> {
    let start = event.start;
    let end = event.start + event.duration();
    let first_day = mode.day_of(start);

    if end == start {
        return vec![DayFragment {
            uid: event.uid.clone(),
            day: first_day,
            duration: TimeDelta::zero(),
        }];
    }

    let mut fragments = Vec::new();
    let mut day = first_day;
    let mut cursor = start;

    while cursor < end {
        let Some(next_day) = day.succ_opt() else {
            break;
        };
        let day_end = mode.day_start(next_day).min(end);

        if day_end > cursor {
            fragments.push(DayFragment {
                uid: event.uid.clone(),
                day,
                duration: day_end - cursor,
            });
            cursor = day_end;
        }
        day = next_day;
    }

    fragments
}

impl Event {
    pub fn day_fragments(&self, mode: TimeMode) -> Vec<DayFragment> {
        day_fragments(self, mode)
    }
}
