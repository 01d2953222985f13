use anyhow::Result;
use caltrack_core::CalendarSource;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::tracker::Tracker;

pub async fn run(tracker: &Tracker, source: CalendarSource) -> Result<()> {
    let syncer = tracker.syncer()?;
    let removed = syncer.clear(&source).await?;

    println!("{}", source.render());
    if removed {
        println!("   {}", "Cache cleared".green());
    } else {
        println!("   {}", "Nothing cached".dimmed());
    }

    Ok(())
}
