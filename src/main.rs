mod commands;
mod render;
mod tracker;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use caltrack_core::date_range::DateRange;
use clap::{Parser, Subcommand};

use commands::report::ReportGroup;
use tracker::Tracker;

#[derive(Parser)]
#[command(name = "caltrack")]
#[command(about = "Sync .ics calendar feeds into a local cache and report where your time goes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch feeds that are due and merge them into the cache
    Sync {
        /// Only operate on this calendar (by name)
        #[arg(short, long)]
        calendar: Option<String>,

        /// Sync even if the cached copy is still fresh
        #[arg(long)]
        force: bool,

        /// List every changed event
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show what is cached for each calendar
    Status {
        /// Only operate on this calendar (by name)
        #[arg(short, long)]
        calendar: Option<String>,
    },
    /// Merge an .ics file into a calendar without deleting anything
    Import {
        file: PathBuf,

        /// Calendar to import into (by name)
        #[arg(short, long)]
        calendar: String,
    },
    /// Total hours per calendar, category or day
    Report {
        /// Only operate on this calendar (by name)
        #[arg(short, long)]
        calendar: Option<String>,

        /// Report from this date (YYYY-MM-DD, or "start" for all past events)
        #[arg(long)]
        from: Option<String>,

        /// Report until this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        #[arg(long, value_enum, default_value_t = ReportGroup::Calendar)]
        by: ReportGroup,
    },
    /// Delete the cached events of a calendar
    Clear {
        #[arg(short, long)]
        calendar: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let tracker = Tracker::load()?;

    match cli.command {
        Commands::Sync {
            calendar,
            force,
            verbose,
        } => {
            tracker.require_calendars()?;
            let calendars = tracker.resolve_calendars(calendar.as_deref())?;
            commands::sync::run(&tracker, calendars, force, verbose).await
        }
        Commands::Status { calendar } => {
            tracker.require_calendars()?;
            let calendars = tracker.resolve_calendars(calendar.as_deref())?;
            commands::status::run(&tracker, calendars)
        }
        Commands::Import { file, calendar } => {
            tracker.require_calendars()?;
            let source = tracker.resolve_calendar(&calendar)?;
            commands::import::run(&tracker, source, &file).await
        }
        Commands::Report {
            calendar,
            from,
            to,
            by,
        } => {
            tracker.require_calendars()?;
            let calendars = tracker.resolve_calendars(calendar.as_deref())?;
            let range = DateRange::from_args(from.as_deref(), to.as_deref())
                .map_err(|e| anyhow::anyhow!(e))?;
            commands::report::run(&tracker, calendars, range, by)
        }
        Commands::Clear { calendar } => {
            let source = tracker.resolve_calendar(&calendar)?;
            commands::clear::run(&tracker, source).await
        }
    }
}
