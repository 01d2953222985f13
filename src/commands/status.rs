use anyhow::Result;
use caltrack_core::{CalendarData, CalendarSource};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize};
use crate::tracker::Tracker;

pub fn run(tracker: &Tracker, calendars: Vec<CalendarSource>) -> Result<()> {
    let syncer = tracker.syncer()?;
    let mode = tracker.time_mode();

    for (i, source) in calendars.iter().enumerate() {
        println!("{}", source.render());

        match syncer.snapshot(&source.id()) {
            Ok(CalendarData::NoData) => println!("   {}", "Never synced".dimmed()),
            Ok(CalendarData::Available(entry)) => {
                println!(
                    "   {} {}",
                    entry.len(),
                    pluralize("event", entry.len())
                );

                let synced = match entry.last_synced {
                    Some(at) => format!("Last synced {}", mode.wall_clock(at).format("%Y-%m-%d %H:%M")),
                    None => "Only imported, never synced".to_string(),
                };
                if syncer.is_due(Some(&entry)) {
                    println!("   {} {}", synced.dimmed(), "(due)".yellow());
                } else {
                    println!("   {}", synced.dimmed());
                }
            }
            Err(e) => println!("   {}", e.to_string().red()),
        }

        if i < calendars.len() - 1 {
            println!();
        }
    }

    Ok(())
}
