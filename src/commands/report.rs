use anyhow::Result;
use caltrack_core::dataset::{self, GroupBy};
use caltrack_core::date_range::DateRange;
use caltrack_core::{CalendarSource, CalendarData};
use clap::ValueEnum;
use owo_colors::OwoColorize;

use crate::render::format_hours;
use crate::tracker::Tracker;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportGroup {
    Calendar,
    Category,
    Day,
}

impl From<ReportGroup> for GroupBy {
    fn from(group: ReportGroup) -> Self {
        match group {
            ReportGroup::Calendar => GroupBy::Calendar,
            ReportGroup::Category => GroupBy::Category,
            ReportGroup::Day => GroupBy::Day,
        }
    }
}

pub fn run(
    tracker: &Tracker,
    calendars: Vec<CalendarSource>,
    range: DateRange,
    by: ReportGroup,
) -> Result<()> {
    let syncer = tracker.syncer()?;

    let mut cached = Vec::new();
    for source in calendars {
        match syncer.snapshot(&source.id())? {
            CalendarData::Available(entry) => cached.push((source, entry)),
            CalendarData::NoData => {
                log::warn!("'{}' has never been synced", source.name);
            }
        }
    }

    let rows = dataset::rows(
        cached.iter().map(|(source, entry)| (source, entry)),
        tracker.time_mode(),
        &range,
    );

    if rows.is_empty() {
        println!("{}", "No events in range".dimmed());
        return Ok(());
    }

    let totals = dataset::totals(&rows, by.into());
    let width = totals.iter().map(|(key, _)| key.chars().count()).max().unwrap_or(0);

    for (key, hours) in &totals {
        println!("{:<width$}  {:>8}h", key, format_hours(*hours), width = width);
    }

    let grand_total: f64 = totals.iter().map(|(_, hours)| hours).sum();
    println!(
        "{}",
        format!("{:<width$}  {:>8}h", "Total", format_hours(grand_total), width = width).bold()
    );

    Ok(())
}
