use std::path::Path;

use anyhow::{Context, Result};
use caltrack_core::CalendarSource;

use crate::render::{Render, render_summary};
use crate::tracker::Tracker;

pub async fn run(tracker: &Tracker, source: CalendarSource, file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Could not read {}", file.display()))?;

    let syncer = tracker.syncer()?;
    let summary = syncer.import(&source, &bytes).await?;

    println!("{}", source.render());
    println!("{}", render_summary(&summary, false, tracker.time_mode()));
    println!("\nImported: {}", summary.counts().render());

    Ok(())
}
