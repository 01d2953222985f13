//! TUI rendering traits for caltrack types.
//!
//! This module provides extension traits that add colored terminal rendering
//! to caltrack-core types using owo_colors.

use caltrack_core::diff::{DiffCounts, DiffKind, EventDiff};
use caltrack_core::{CalendarSource, Event, SyncStatus, SyncSummary, TimeMode};
use owo_colors::OwoColorize;

/// Extension trait for TUI rendering with colors.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for DiffKind {
    fn render(&self) -> String {
        let symbol = self.symbol();
        match self {
            DiffKind::Create => symbol.green().to_string(),
            DiffKind::Update => symbol.yellow().to_string(),
            DiffKind::Delete => symbol.red().to_string(),
        }
    }
}

impl Render for CalendarSource {
    fn render(&self) -> String {
        match self.color.as_deref().and_then(parse_hex_color) {
            Some((r, g, b)) => format!("📅 {}", self.name.truecolor(r, g, b)),
            None => format!("📅 {}", self.name),
        }
    }
}

impl Render for DiffCounts {
    fn render(&self) -> String {
        format!(
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        )
    }
}

fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

/// Colorize text according to the diff kind
fn colorize_diff(kind: DiffKind, text: &str) -> String {
    match kind {
        DiffKind::Create => text.green().to_string(),
        DiffKind::Update => text.yellow().to_string(),
        DiffKind::Delete => text.red().to_string(),
    }
}

/// Event start and length on the active wall clock, e.g. `2024-03-11 09:00 (0.25h)`
pub fn render_event_time(event: &Event, mode: TimeMode) -> String {
    format!(
        "{} ({}h)",
        mode.wall_clock(event.start).format("%Y-%m-%d %H:%M"),
        format_hours(event.duration_hours())
    )
}

pub fn format_hours(hours: f64) -> String {
    let formatted = format!("{:.2}", hours);
    formatted.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn render_diff(diff: &EventDiff, mode: TimeMode) -> String {
    let event = diff.event();
    let summary = colorize_diff(diff.kind, &event.to_string());
    let time = render_event_time(event, mode);

    format!("{} {} {}", diff.kind.render(), summary, time.dimmed())
}

/// Threshold for compact view (show counts instead of individual events)
const COMPACT_THRESHOLD: usize = 5;

/// Render a list of diffs, using compact view if there are many events and verbose is false
fn render_diff_list(diffs: &[EventDiff], verbose: bool, mode: TimeMode, lines: &mut Vec<String>) {
    if verbose || diffs.len() <= COMPACT_THRESHOLD {
        for diff in diffs {
            lines.push(format!("   {}", render_diff(diff, mode)));
            if diff.kind == DiffKind::Update {
                lines.extend(
                    render_field_diffs(diff, mode)
                        .into_iter()
                        .map(|l| format!("      {}", l)),
                );
            }
        }
    } else {
        let counts = DiffCounts::from_diffs(diffs);

        if counts.created > 0 {
            let label = format!("({} new {})", counts.created, pluralize("event", counts.created));
            lines.push(format!("   {} {}", "+".green(), label.green()));
        }
        if counts.updated > 0 {
            let label = format!("({} changed {})", counts.updated, pluralize("event", counts.updated));
            lines.push(format!("   {} {}", "~".yellow(), label.yellow()));
        }
        if counts.deleted > 0 {
            let label = format!("({} deleted {})", counts.deleted, pluralize("event", counts.deleted));
            lines.push(format!("   {} {}", "-".red(), label.red()));
        }
    }
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{}s", word)
    }
}

/// Render field-by-field differences for an update
fn render_field_diffs(diff: &EventDiff, mode: TimeMode) -> Vec<String> {
    let mut lines = Vec::new();

    if let (Some(old), Some(new)) = (&diff.old, &diff.new) {
        if old.title != new.title {
            lines.push(format!("{}: {} → {}", "title".dimmed(), old.title.red(), new.title.green()));
        }
        if old.start != new.start {
            let (from, to) = (mode.wall_clock(old.start), mode.wall_clock(new.start));
            lines.push(format!("{}: {} → {}", "start".dimmed(), from.to_string().red(), to.to_string().green()));
        }
        if old.end != new.end {
            let (from, to) = (mode.wall_clock(old.end), mode.wall_clock(new.end));
            lines.push(format!("{}: {} → {}", "end".dimmed(), from.to_string().red(), to.to_string().green()));
        }
        if old.category != new.category {
            let from = old.category.as_deref().unwrap_or("(none)");
            let to = new.category.as_deref().unwrap_or("(none)");
            lines.push(format!("{}: {} → {}", "category".dimmed(), from.red(), to.green()));
        }
    }

    lines
}

/// Body lines for a merged sync or import.
pub fn render_summary(summary: &SyncSummary, verbose: bool, mode: TimeMode) -> String {
    let mut lines = Vec::new();

    if summary.diffs.is_empty() {
        lines.push("   No changes".dimmed().to_string());
    } else {
        render_diff_list(&summary.diffs, verbose, mode, &mut lines);
    }

    let mut notes = vec![format!("{} cached", summary.total)];
    if summary.retained_history > 0 {
        notes.push(format!("{} kept from history", summary.retained_history));
    }
    if summary.skipped > 0 {
        notes.push(format!("{} skipped", summary.skipped));
    }
    lines.push(format!("   {}", notes.join(", ").dimmed()));

    lines.join("\n")
}

pub fn render_status(status: &SyncStatus, verbose: bool, mode: TimeMode) -> String {
    match status {
        SyncStatus::Fresh => "   Up to date".dimmed().to_string(),
        SyncStatus::Synced(summary) => render_summary(summary, verbose, mode),
        SyncStatus::Failed {
            error,
            stale_available,
        } => {
            let mut line = format!("   {}", error.to_string().red());
            if *stale_available {
                line.push_str(&format!("\n   {}", "Showing previously cached events".dimmed()));
            }
            line
        }
    }
}
