use anyhow::Result;
use caltrack_core::diff::DiffCounts;
use caltrack_core::{CalendarSource, SyncStatus};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize, render_status};
use crate::tracker::Tracker;
use crate::utils::tui;

pub async fn run(
    tracker: &Tracker,
    calendars: Vec<CalendarSource>,
    force: bool,
    verbose: bool,
) -> Result<()> {
    let syncer = tracker.syncer()?;
    let mode = tracker.time_mode();

    let spinner = tui::create_spinner(format!(
        "Syncing {} {}",
        calendars.len(),
        pluralize("calendar", calendars.len())
    ));
    let reports = syncer.sync_all(&calendars, force).await;
    spinner.finish_and_clear();

    let mut totals = DiffCounts::default();
    let mut failed = 0;

    for (i, report) in reports.iter().enumerate() {
        let mut heading = report.source.render();
        if let SyncStatus::Synced(summary) = &report.status {
            // Unnamed sources show the name the feed gives itself
            if report.source.is_unnamed()
                && let Some(feed_name) = &summary.feed_name
            {
                heading = format!("📅 {}", feed_name);
            }
            totals += summary.counts();
        }
        if report.is_failure() {
            failed += 1;
        }

        println!("{}", heading);
        println!("{}", render_status(&report.status, verbose, mode));

        if i < reports.len() - 1 {
            println!();
        }
    }

    if !totals.is_empty() {
        println!("\nSynced: {}", totals.render());
    }

    if failed > 0 {
        println!(
            "{}",
            format!("{} {} failed to sync", failed, pluralize("calendar", failed)).red()
        );
    }

    Ok(())
}
